use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    actions::{Action, ActionContext},
    model::{BotMessageModel, TgMessage},
    prefix::MessagePrefix,
    text::Label,
};

pub const COMMAND: &str = "/start";

const WELCOME: [Label; 4] = [
    Label::WelcomeMessage,
    Label::WelcomeMessageGroup,
    Label::WelcomeMessageMore,
    Label::DonateHint,
];

pub struct StartAction {
    ctx: Arc<ActionContext>,
}

impl StartAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for StartAction {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.is_command(model, COMMAND)
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        info!(%prefix, "sending welcome message");
        let lang = self.ctx.lang(model, prefix).await;

        for label in WELCOME {
            if let Err(err) = self.ctx.send_label(model, label, lang, None).await {
                self.ctx
                    .report_failure(model, &err, "unable to send welcome message", prefix)
                    .await;
                return;
            }
        }
        info!(%prefix, "welcome message sent");
    }
}
