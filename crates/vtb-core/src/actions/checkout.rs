use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
    actions::{Action, ActionContext},
    analytics::AnalyticsData,
    domain::{ChatId, DonationId},
    model::{BotMessageModel, InvoicePayload, TgMessage, TgPreCheckoutQuery},
    ports::DonationStatus,
    prefix::{CorrelationId, MessagePrefix},
};

/// Payment confirmation: pre-checkout answers and successful payments.
pub struct CheckoutAction {
    ctx: Arc<ActionContext>,
}

impl CheckoutAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }

    /// Always approve, then mark the donation pending (best-effort).
    pub async fn confirm_checkout(&self, query: &TgPreCheckoutQuery, analytics: &AnalyticsData) {
        analytics.set_command("pre-checkout");
        let payload = InvoicePayload::decode(&query.invoice_payload);
        let prefix = match &payload {
            Ok(p) => MessagePrefix::resume(p.chat_id, CorrelationId::from_raw(p.correlation_id.clone())),
            Err(_) => MessagePrefix::new(ChatId(query.from.id)),
        };

        if let Err(err) = self.ctx.api.answer_pre_checkout_query(&query.id, None).await {
            error!(%prefix, "unable to confirm checkout: {err}");
            analytics.add_error("unable to confirm checkout");
            return;
        }
        info!(%prefix, "checkout confirmed");

        match payload {
            Ok(p) => self.mark(p.donation_id, DonationStatus::Pending, &prefix, analytics).await,
            Err(err) => {
                error!(%prefix, "unable to parse the donation id, will not update the row: {err}");
                analytics.add_error("invalid invoice payload");
            }
        }
    }

    async fn mark(
        &self,
        id: DonationId,
        status: DonationStatus,
        prefix: &MessagePrefix,
        analytics: &AnalyticsData,
    ) {
        match self.ctx.store.update_donation(id, status).await {
            Ok(()) => info!(%prefix, donation_id = id.0, ?status, "donation updated"),
            Err(err) => {
                error!(%prefix, donation_id = id.0, "unable to update the donation: {err}");
                analytics.add_error("unable to update the donation");
            }
        }
    }
}

#[async_trait]
impl Action for CheckoutAction {
    fn name(&self) -> &'static str {
        "checkout"
    }

    fn run_condition(&self, msg: &TgMessage, _model: &BotMessageModel) -> bool {
        msg.successful_payment.is_some()
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        let Some(donation_id) = model.payment.as_ref().and_then(|p| p.donation_id) else {
            error!(%prefix, "unable to parse the donation id, will not update the row");
            model.analytics.add_error("invalid invoice payload");
            return;
        };
        self.mark(donation_id, DonationStatus::Received, prefix, &model.analytics)
            .await;
    }
}
