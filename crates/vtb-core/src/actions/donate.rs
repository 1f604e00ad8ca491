use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
    actions::{Action, ActionContext},
    button::{ButtonKind, ButtonState},
    errors::Error,
    messaging::types::{InlineButton, InlineKeyboard, Invoice},
    model::{BotMessageModel, InvoicePayload, TgMessage},
    payment::{to_currency, PaymentService, DONATION_LEVELS},
    prefix::MessagePrefix,
    text::Label,
    Result,
};

pub const COMMAND: &str = "/donate";

pub struct DonateAction {
    ctx: Arc<ActionContext>,
    payment: Arc<dyn PaymentService>,
}

impl DonateAction {
    pub fn new(ctx: Arc<ActionContext>, payment: Arc<dyn PaymentService>) -> Self {
        Self { ctx, payment }
    }

    fn keyboard(&self, prefix: &MessagePrefix) -> Result<InlineKeyboard> {
        let mut row = Vec::with_capacity(DONATION_LEVELS.len());
        for level in DONATION_LEVELS {
            let data = ButtonState::new(
                ButtonKind::Donation,
                level.amount.to_string(),
                prefix.id.clone(),
            )
            .encode()?;
            row.push(InlineButton::callback(
                to_currency(level.amount, level.meta),
                data,
            ));
        }
        Ok(InlineKeyboard::single_row(row))
    }

    async fn send_donate_message(&self, model: &BotMessageModel, prefix: &MessagePrefix) -> Result<()> {
        let lang = self.ctx.lang(model, prefix).await;
        if !self.payment.is_ready() {
            self.ctx
                .send_label(model, Label::PaymentsUnavailable, lang, None)
                .await?;
            return Ok(());
        }
        let keyboard = self.keyboard(prefix)?;
        self.ctx
            .send_label(model, Label::DonateCommandMessage, lang, Some(keyboard))
            .await?;
        Ok(())
    }

    /// Donation level clicked: create the row and send an invoice.
    pub async fn run_callback(
        &self,
        model: &BotMessageModel,
        button: &ButtonState,
        prefix: &MessagePrefix,
    ) {
        model.analytics.set_command(COMMAND);
        let price = match button.value.parse::<u32>() {
            Ok(p) if DONATION_LEVELS.iter().any(|l| l.amount == p) => p,
            _ => {
                error!(%prefix, value = %button.value, "price is not a number");
                model.analytics.add_error("price is not specified");
                return;
            }
        };

        if let Err(err) = self.send_invoice(model, price, prefix).await {
            self.ctx
                .report_failure(model, &err, "unable to send the invoice", prefix)
                .await;
        }
    }

    async fn send_invoice(&self, model: &BotMessageModel, price: u32, prefix: &MessagePrefix) -> Result<()> {
        if !self.payment.is_ready() {
            return Err(Error::Config("payment service is not set".to_string()));
        }
        let amount = price
            .checked_mul(100)
            .ok_or_else(|| Error::Payload(format!("price {price} is out of range")))?;
        let lang = self.ctx.lang(model, prefix).await;
        let donation_id = self.ctx.store.create_donation(model.chat_id, price).await?;
        let provider_token = self.payment.get_link(price, donation_id, lang)?;

        let payload = InvoicePayload {
            donation_id,
            chat_id: model.chat_id,
            correlation_id: prefix.id.as_str().to_string(),
        }
        .encode()?;

        let invoice = Invoice {
            chat_id: model.chat_id,
            title: self.ctx.text.t(Label::DonationTitle, lang),
            description: self.ctx.text.t(Label::DonationDescription, lang),
            payload,
            provider_token,
            currency: self.payment.currency().to_string(),
            label: self.ctx.text.t(Label::DonationLabel, lang),
            amount,
            start_parameter: format!("donate-{price}"),
            photo_url: None,
            thread_id: model.forum_thread_id,
        };
        self.ctx.api.send_invoice(&invoice).await?;
        info!(%prefix, donation_id = donation_id.0, price, "invoice sent");
        Ok(())
    }
}

#[async_trait]
impl Action for DonateAction {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.is_command(model, COMMAND)
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        info!(%prefix, "sending donate message");
        if let Err(err) = self.send_donate_message(model, prefix).await {
            self.ctx
                .report_failure(model, &err, "unable to send donate message", prefix)
                .await;
        }
    }
}
