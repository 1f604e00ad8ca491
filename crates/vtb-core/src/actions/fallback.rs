use async_trait::async_trait;
use tracing::debug;

use crate::{
    actions::Action,
    model::{BotMessageModel, TgMessage},
    prefix::MessagePrefix,
};

/// Runs when nothing else matched. Does nothing.
pub struct CoreAction;

#[async_trait]
impl Action for CoreAction {
    fn name(&self) -> &'static str {
        crate::analytics::NO_CONTENT
    }

    fn run_condition(&self, _msg: &TgMessage, _model: &BotMessageModel) -> bool {
        true
    }

    async fn run_action(&self, _model: &BotMessageModel, prefix: &MessagePrefix) {
        debug!(%prefix, "no action matched");
    }
}
