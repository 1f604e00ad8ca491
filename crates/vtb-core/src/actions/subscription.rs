use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{error, info};

use crate::{
    actions::{Action, ActionContext},
    button::{ButtonKind, ButtonState},
    cache::BoundedCache,
    domain::{MessageRef, UserId},
    errors::Error,
    language::LanguageCode,
    messaging::types::{InlineButton, InlineKeyboard},
    model::{BotMessageModel, TgMessage},
    ports::Subscription,
    prefix::MessagePrefix,
    text::Label,
    Result,
};

pub const COMMAND: &str = "/subscription";

/// Callback values carried in subscription buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionStep {
    Unsubscribe,
    UnsubscribeConfirmed,
    Back,
    Trial,
    TrialConfirmed,
}

impl SubscriptionStep {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStep::Unsubscribe => "u",
            SubscriptionStep::UnsubscribeConfirmed => "-",
            SubscriptionStep::Back => "b",
            SubscriptionStep::Trial => "t",
            SubscriptionStep::TrialConfirmed => "tc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "u" => Some(SubscriptionStep::Unsubscribe),
            "-" => Some(SubscriptionStep::UnsubscribeConfirmed),
            "b" => Some(SubscriptionStep::Back),
            "t" => Some(SubscriptionStep::Trial),
            "tc" => Some(SubscriptionStep::TrialConfirmed),
            _ => None,
        }
    }
}

/// Where the overview is rendered: a fresh message or an edit in place.
#[derive(Clone, Copy)]
enum Target {
    New,
    Edit(MessageRef),
}

pub struct SubscriptionAction {
    ctx: Arc<ActionContext>,
    cache: BoundedCache<UserId, Subscription>,
}

impl SubscriptionAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        let cache = BoundedCache::new(ctx.settings.subscription_cache_size);
        Self { ctx, cache }
    }

    pub fn cache(&self) -> &BoundedCache<UserId, Subscription> {
        &self.cache
    }

    async fn subscription(&self, user_id: UserId) -> Result<Option<Subscription>> {
        if let Some(sub) = self.cache.get(&user_id) {
            return Ok(Some(sub));
        }
        let sub = self.ctx.store.get_subscription(user_id).await?;
        if let Some(sub) = &sub {
            self.cache.insert(user_id, sub.clone());
        }
        Ok(sub)
    }

    fn button(
        &self,
        label: Label,
        step: SubscriptionStep,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> Result<InlineButton> {
        let data = ButtonState::new(ButtonKind::Subscription, step.as_str(), prefix.id.clone())
            .encode()?;
        Ok(InlineButton::callback(self.ctx.text.t(label, lang), data))
    }

    async fn render(
        &self,
        model: &BotMessageModel,
        target: Target,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<()> {
        match target {
            Target::New => self.ctx.send(model, text, keyboard).await.map(|_| ()),
            Target::Edit(msg) => self.ctx.edit(msg, text, keyboard.as_ref()).await,
        }
    }

    fn user_id(model: &BotMessageModel) -> Result<UserId> {
        model
            .user_id
            .ok_or_else(|| Error::Payload("no user id for subscription".to_string()))
    }

    async fn show_overview(
        &self,
        model: &BotMessageModel,
        target: Target,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> Result<()> {
        let user_id = Self::user_id(model)?;
        let now = Utc::now();
        let t = &self.ctx.text;

        let sub = self.subscription(user_id).await?;

        if let Some(sub) = sub.as_ref().filter(|s| s.is_active(now)) {
            let date = t.date(sub.ends_at, lang);
            let text = t.t_with(Label::SubscriptionActive, lang, &[("date", &date)]);
            let keyboard = InlineKeyboard::single_row(vec![self.button(
                Label::BtnUnsubscribe,
                SubscriptionStep::Unsubscribe,
                lang,
                prefix,
            )?]);
            return self.render(model, target, &text, Some(keyboard)).await;
        }

        if let Some(sub) = sub.as_ref().filter(|s| s.canceled && s.ends_at > now) {
            let date = t.date(sub.ends_at, lang);
            let text = t.t_with(Label::SubscriptionCanceled, lang, &[("date", &date)]);
            return self.render(model, target, &text, None).await;
        }

        if self.ctx.store.has_had_trial(user_id).await? {
            let text = t.t(Label::SubscriptionTrialUsed, lang);
            return self.render(model, target, &text, None).await;
        }

        let text = t.t(Label::SubscriptionNone, lang);
        let keyboard = InlineKeyboard::single_row(vec![self.button(
            Label::BtnTrial,
            SubscriptionStep::Trial,
            lang,
            prefix,
        )?]);
        self.render(model, target, &text, Some(keyboard)).await
    }

    async fn confirm_unsubscribe(
        &self,
        model: &BotMessageModel,
        msg: MessageRef,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> Result<()> {
        let user_id = Self::user_id(model)?;
        let Some(sub) = self.subscription(user_id).await? else {
            return Err(Error::Store(format!(
                "no subscription for user {}, unable to unsubscribe",
                user_id.0
            )));
        };
        if sub.canceled {
            return self.cancel(model, msg, lang).await;
        }

        let date = self.ctx.text.date(sub.ends_at, lang);
        let text = self
            .ctx
            .text
            .t_with(Label::ConfirmUnsubscribe, lang, &[("date", &date)]);
        let keyboard = InlineKeyboard::single_row(vec![
            self.button(
                Label::BtnConfirmUnsubscribe,
                SubscriptionStep::UnsubscribeConfirmed,
                lang,
                prefix,
            )?,
            self.button(Label::BtnBack, SubscriptionStep::Back, lang, prefix)?,
        ]);
        self.ctx.edit(msg, &text, Some(&keyboard)).await
    }

    async fn cancel(&self, model: &BotMessageModel, msg: MessageRef, lang: LanguageCode) -> Result<()> {
        let user_id = Self::user_id(model)?;
        self.ctx.store.cancel_subscription(user_id).await?;
        self.cache.invalidate(&user_id);
        let text = self.ctx.text.t(Label::Unsubscribed, lang);
        self.ctx.edit(msg, &text, None).await
    }

    fn trial_end(&self) -> chrono::DateTime<Utc> {
        Utc::now() + Duration::days(self.ctx.settings.trial_duration_days.max(1))
    }

    async fn has_active(&self, user_id: UserId) -> Result<bool> {
        Ok(self
            .subscription(user_id)
            .await?
            .is_some_and(|s| s.is_active(Utc::now())))
    }

    async fn confirm_trial(
        &self,
        model: &BotMessageModel,
        msg: MessageRef,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> Result<()> {
        let user_id = Self::user_id(model)?;
        if self.has_active(user_id).await? || self.ctx.store.has_had_trial(user_id).await? {
            return self.show_overview(model, Target::Edit(msg), lang, prefix).await;
        }

        let date = self.ctx.text.date(self.trial_end(), lang);
        let text = self
            .ctx
            .text
            .t_with(Label::ConfirmTrial, lang, &[("date", &date)]);
        let keyboard = InlineKeyboard::single_row(vec![
            self.button(Label::BtnBack, SubscriptionStep::Back, lang, prefix)?,
            self.button(
                Label::BtnTrialConfirm,
                SubscriptionStep::TrialConfirmed,
                lang,
                prefix,
            )?,
        ]);
        self.ctx.edit(msg, &text, Some(&keyboard)).await
    }

    async fn start_trial(
        &self,
        model: &BotMessageModel,
        msg: MessageRef,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> Result<()> {
        let user_id = Self::user_id(model)?;
        if self.has_active(user_id).await? || self.ctx.store.has_had_trial(user_id).await? {
            return self.show_overview(model, Target::Edit(msg), lang, prefix).await;
        }

        let sub = Subscription {
            user_id,
            chat_id: model.chat_id,
            ends_at: self.trial_end(),
            is_trial: true,
            canceled: false,
        };
        self.ctx.store.create_subscription(sub.clone()).await?;
        self.cache.invalidate(&user_id);
        info!(%prefix, user_id = user_id.0, "trial started");

        let date = self.ctx.text.date(sub.ends_at, lang);
        let text = self
            .ctx
            .text
            .t_with(Label::TrialActivated, lang, &[("date", &date)]);
        self.ctx.edit(msg, &text, None).await
    }

    /// Subscription button clicked: every step edits the message in place.
    pub async fn run_callback(
        &self,
        model: &BotMessageModel,
        button: &ButtonState,
        prefix: &MessagePrefix,
    ) {
        model.analytics.set_command(COMMAND);
        let Some(step) = SubscriptionStep::parse(&button.value) else {
            error!(%prefix, value = %button.value, "unknown subscription button");
            model.analytics.add_error("unknown subscription button");
            return;
        };
        let msg = MessageRef {
            chat_id: model.chat_id,
            message_id: model.id,
        };
        let lang = self.ctx.lang(model, prefix).await;

        let result = match step {
            SubscriptionStep::Unsubscribe => self.confirm_unsubscribe(model, msg, lang, prefix).await,
            SubscriptionStep::UnsubscribeConfirmed => self.cancel(model, msg, lang).await,
            SubscriptionStep::Back => self.show_overview(model, Target::Edit(msg), lang, prefix).await,
            SubscriptionStep::Trial => self.confirm_trial(model, msg, lang, prefix).await,
            SubscriptionStep::TrialConfirmed => self.start_trial(model, msg, lang, prefix).await,
        };
        if let Err(err) = result {
            self.ctx
                .report_failure(model, &err, "unable to handle subscription button", prefix)
                .await;
        }
    }
}

#[async_trait]
impl Action for SubscriptionAction {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.is_command(model, COMMAND)
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        info!(%prefix, "sending subscription message");
        let lang = self.ctx.lang(model, prefix).await;

        let result = if model.is_group {
            let name = self
                .ctx
                .settings
                .bot_name
                .as_deref()
                .map(|n| format!("@{n}"))
                .unwrap_or_default();
            let text = self
                .ctx
                .text
                .t_with(Label::ManageSubscriptionInDms, lang, &[("name", &name)]);
            self.ctx.send(model, &text, None).await.map(|_| ())
        } else {
            self.show_overview(model, Target::New, lang, prefix).await
        };

        if let Err(err) = result {
            self.ctx
                .report_failure(model, &err, "unable to send subscription message", prefix)
                .await;
        }
    }
}
