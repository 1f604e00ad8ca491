use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    actions::{Action, ActionContext},
    messaging::types::{InlineButton, InlineKeyboard},
    model::{BotMessageModel, TgMessage},
    prefix::MessagePrefix,
    text::Label,
};

pub const COMMAND: &str = "/support";

pub struct SupportAction {
    ctx: Arc<ActionContext>,
}

impl SupportAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for SupportAction {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.is_command(model, COMMAND)
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        info!(%prefix, "sending support message");
        let lang = self.ctx.lang(model, prefix).await;
        let settings = &self.ctx.settings;

        let mut buttons = vec![InlineButton::url(
            self.ctx.text.t(Label::GithubIssues, lang),
            settings.issues_url.clone(),
        )];
        if let Some(author) = &settings.author_url {
            buttons.push(InlineButton::url(
                self.ctx.text.t(Label::ContactAuthor, lang),
                author.clone(),
            ));
        }

        let keyboard = InlineKeyboard::single_row(buttons);
        if let Err(err) = self
            .ctx
            .send_label(model, Label::SupportCommand, lang, Some(keyboard))
            .await
        {
            self.ctx
                .report_failure(model, &err, "unable to send support message", prefix)
                .await;
        }
    }
}
