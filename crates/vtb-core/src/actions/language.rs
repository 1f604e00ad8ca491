use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::{
    actions::{Action, ActionContext},
    button::{ButtonKind, ButtonState},
    domain::MessageRef,
    language::LanguageCode,
    messaging::types::{InlineButton, InlineKeyboard},
    model::{BotMessageModel, TgMessage},
    prefix::MessagePrefix,
    text::Label,
    Result,
};

pub const COMMAND: &str = "/lang";

pub struct LanguageAction {
    ctx: Arc<ActionContext>,
}

impl LanguageAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }

    fn keyboard(&self, lang: LanguageCode, prefix: &MessagePrefix) -> Result<InlineKeyboard> {
        let mut row = Vec::with_capacity(LanguageCode::ALL.len());
        for code in LanguageCode::ALL {
            let label = match code {
                LanguageCode::En => Label::BtnEnglish,
                LanguageCode::Ru => Label::BtnRussian,
            };
            let data = ButtonState::new(ButtonKind::Language, code.as_str(), prefix.id.clone())
                .encode()?;
            row.push(InlineButton::callback(self.ctx.text.t(label, lang), data));
        }
        Ok(InlineKeyboard::single_row(row))
    }

    async fn send_selector(&self, model: &BotMessageModel, prefix: &MessagePrefix) -> Result<()> {
        let lang = self.ctx.lang(model, prefix).await;
        let keyboard = self.keyboard(lang, prefix)?;
        self.ctx
            .send_label(model, Label::ChangeLangTitle, lang, Some(keyboard))
            .await?;
        Ok(())
    }

    /// Language button clicked: persist and confirm by editing the selector.
    pub async fn run_callback(
        &self,
        model: &BotMessageModel,
        button: &ButtonState,
        prefix: &MessagePrefix,
    ) {
        model.analytics.set_command(COMMAND);
        let msg = MessageRef {
            chat_id: model.chat_id,
            message_id: model.id,
        };

        let Some(lang) = LanguageCode::parse(&button.value) else {
            error!(%prefix, value = %button.value, "unknown language in button");
            model.analytics.add_error("unknown language button");
            return;
        };

        let (label, result) = match self.ctx.languages.update(model.chat_id, lang).await {
            Ok(()) => {
                info!(%prefix, %lang, "language updated");
                let text = self.ctx.text.t(Label::ChangeLang, lang);
                (Label::ChangeLang, self.ctx.edit(msg, &text, None).await)
            }
            Err(err) => {
                error!(%prefix, "unable to update the language: {err}");
                model.analytics.add_error("unable to update the language");
                let current = self.ctx.lang(model, prefix).await;
                let text = self.ctx.text.t(Label::UpdateLanguageError, current);
                (Label::UpdateLanguageError, self.ctx.edit(msg, &text, None).await)
            }
        };

        if let Err(err) = result {
            self.ctx
                .report_failure(model, &err, &format!("unable to show {label:?}"), prefix)
                .await;
        }
    }
}

#[async_trait]
impl Action for LanguageAction {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.is_command(model, COMMAND)
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        info!(%prefix, "sending language selector");
        if let Err(err) = self.send_selector(model, prefix).await {
            self.ctx
                .report_failure(model, &err, "unable to send the language selector", prefix)
                .await;
        }
    }
}

