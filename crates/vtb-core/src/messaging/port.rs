use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{InlineKeyboard, Invoice, MessagingCapabilities, SendOptions},
    Result,
};

/// Outbound Bot API surface used by the actions.
///
/// Every call is a suspension point and may fail with `Error::Platform`, which
/// the classifier turns into retry / suppress / notify decisions.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: &SendOptions,
    ) -> Result<MessageRef>;

    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Resolve a downloadable URL for a file the platform stores.
    async fn get_file_link(&self, file_id: &str) -> Result<String>;

    async fn answer_pre_checkout_query(&self, query_id: &str, error: Option<&str>) -> Result<()>;

    async fn send_invoice(&self, invoice: &Invoice) -> Result<MessageRef>;
}
