use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    actions::Action,
    domain::ChatId,
    model::{BotMessageModel, TgMessage},
    ports::StatStore,
    prefix::MessagePrefix,
};

/// Short-circuits every other action for chats flagged in the store.
pub struct IgnoreAction {
    store: Arc<dyn StatStore>,
}

impl IgnoreAction {
    pub fn new(store: Arc<dyn StatStore>) -> Self {
        Self { store }
    }

    /// Store failures count as "not ignored".
    pub async fn is_ignored(&self, chat_id: ChatId, prefix: &MessagePrefix) -> bool {
        match self.store.is_chat_ignored(chat_id).await {
            Ok(ignored) => ignored,
            Err(err) => {
                warn!(%prefix, "unable to read the ignore flag: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl Action for IgnoreAction {
    fn name(&self) -> &'static str {
        "ignore"
    }

    /// Only consulted after `is_ignored` returned true.
    fn run_condition(&self, _msg: &TgMessage, _model: &BotMessageModel) -> bool {
        true
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        info!(%prefix, "chat is ignored");
        model.analytics.add_event("ignored chat");
    }
}
