//! Telegram adapter (teloxide + axum).
//!
//! `TelegramMessenger` implements the `vtb-core` MessagingPort over the Bot API;
//! `server` exposes the webhook / health HTTP surface.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, LabeledPrice, ParseMode},
    ApiError, RequestError,
};


pub mod server;

use vtb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::{Error, PlatformFailure},
    messaging::{
        port::MessagingPort,
        types::{ButtonKind, InlineKeyboard, Invoice, MessagingCapabilities, SendOptions},
    },
    Result,
};

use crate::server::WebhookRegistry;

const BLOCKED_BY_USER: &str = "Forbidden: bot was blocked by the user";
const NOT_MODIFIED: &str = "Bad Request: message is not modified";

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    /// Every Bot API call made through this messenger is bounded by `timeout`.
    pub fn new(token: &str, timeout: Duration, max_message_len: usize) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("telegram http client: {e}")))?;
        Ok(Self {
            bot: Bot::with_client(token, client),
            max_message_len,
        })
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// `@username` of the bot, without the `@`.
    pub async fn bot_username(&self) -> Result<String> {
        let me = self.call(|| self.bot.get_me()).await?;
        Ok(me.username().to_string())
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn markup(keyboard: &InlineKeyboard) -> Result<InlineKeyboardMarkup> {
        let mut rows = Vec::with_capacity(keyboard.rows.len());
        for row in &keyboard.rows {
            let mut buttons = Vec::with_capacity(row.len());
            for b in row {
                let button = match &b.kind {
                    ButtonKind::Callback(data) => {
                        InlineKeyboardButton::callback(b.label.clone(), data.clone())
                    }
                    ButtonKind::Url(url) => {
                        let url = reqwest::Url::parse(url)
                            .map_err(|e| Error::Payload(format!("bad button url {url}: {e}")))?;
                        InlineKeyboardButton::url(b.label.clone(), url)
                    }
                };
                buttons.push(button);
            }
            rows.push(buttons);
        }
        Ok(InlineKeyboardMarkup::new(rows))
    }

    /// One request, no resend: rate limits surface as a 429 `PlatformFailure`
    /// and the caller decides.
    async fn call<T, Fut>(&self, op: impl FnOnce() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        op().await.map_err(map_request_error)
    }

    /// Point the bot at another Bot API server.
    pub fn with_api_url(mut self, url: reqwest::Url) -> Self {
        self.bot = self.bot.set_api_url(url);
        self
    }
}

/// Reduce a teloxide error to the status/description pair the classifier reads.
pub fn map_request_error(e: RequestError) -> Error {
    let failure = match e {
        RequestError::RetryAfter(d) => {
            PlatformFailure::new(Some(429), "Too Many Requests").with_retry_after(d.as_secs())
        }
        RequestError::Api(ApiError::BotBlocked) => PlatformFailure::new(Some(403), BLOCKED_BY_USER),
        RequestError::Api(ApiError::MessageNotModified) => {
            PlatformFailure::new(Some(400), NOT_MODIFIED)
        }
        RequestError::Api(other) => PlatformFailure::new(Some(400), other.to_string()),
        other => PlatformFailure::new(None, other.to_string()),
    };
    Error::Platform(failure)
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_edit: true,
            max_message_len: self.max_message_len,
        }
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: &SendOptions,
    ) -> Result<MessageRef> {
        let markup = opts.keyboard.as_ref().map(Self::markup).transpose()?;
        let msg = self
            .call(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .disable_web_page_preview(true);
                if !opts.disable_markup {
                    req = req.parse_mode(ParseMode::Html);
                }
                if let Some(thread) = opts.thread_id {
                    req = req.message_thread_id(thread.0);
                }
                if let Some(m) = &markup {
                    req = req.reply_markup(m.clone());
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let markup = keyboard.map(Self::markup).transpose()?;
        self.call(|| {
            let mut req = self
                .bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html);
            if let Some(m) = &markup {
                req = req.reply_markup(m.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.call(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn get_file_link(&self, file_id: &str) -> Result<String> {
        let file = self
            .call(|| self.bot.get_file(file_id.to_string()))
            .await?;
        let api = self.bot.api_url().to_string();
        Ok(format!(
            "{}/file/bot{}/{}",
            api.trim_end_matches('/'),
            self.bot.token(),
            file.path
        ))
    }

    async fn answer_pre_checkout_query(&self, query_id: &str, error: Option<&str>) -> Result<()> {
        self.call(|| {
            let mut req = self
                .bot
                .answer_pre_checkout_query(query_id.to_string(), error.is_none());
            if let Some(message) = error {
                req = req.error_message(message.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_invoice(&self, invoice: &Invoice) -> Result<MessageRef> {
        let photo = invoice
            .photo_url
            .as_deref()
            .map(reqwest::Url::parse)
            .transpose()
            .map_err(|e| Error::Payload(format!("bad invoice photo url: {e}")))?;
        let msg = self
            .call(|| {
                let mut req = self
                    .bot
                    .send_invoice(
                        Self::tg_chat(invoice.chat_id),
                        invoice.title.clone(),
                        invoice.description.clone(),
                        invoice.payload.clone(),
                        invoice.provider_token.clone(),
                        invoice.currency.clone(),
                        vec![LabeledPrice::new(invoice.label.clone(), invoice.amount as i32)],
                    )
                    .start_parameter(invoice.start_parameter.clone());
                if let Some(url) = &photo {
                    req = req.photo_url(url.clone());
                }
                if let Some(thread) = invoice.thread_id {
                    req = req.message_thread_id(thread.0);
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id: invoice.chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

#[async_trait]
impl WebhookRegistry for TelegramMessenger {
    async fn current_url(&self) -> Result<String> {
        let info = self.call(|| self.bot.get_webhook_info()).await?;
        Ok(info.url.map(|u| u.to_string()).unwrap_or_default())
    }

    async fn register(&self, url: &str) -> Result<()> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("bad webhook url {url}: {e}")))?;
        self.call(|| self.bot.set_webhook(url.clone())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtb_core::{
        classifier::{classify, ErrorKind},
        messaging::types::InlineButton,
    };

    #[test]
    fn maps_rate_limit_with_retry_after() {
        let err = map_request_error(RequestError::RetryAfter(Duration::from_secs(7)));
        let failure = err.platform().unwrap();
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.retry_after, Some(7));
        assert_eq!(classify(&err), ErrorKind::RateLimited);
    }

    #[test]
    fn maps_blocked_and_not_modified() {
        let blocked = map_request_error(RequestError::Api(ApiError::BotBlocked));
        assert_eq!(classify(&blocked), ErrorKind::BlockedByRecipient);

        let same = map_request_error(RequestError::Api(ApiError::MessageNotModified));
        assert_eq!(classify(&same), ErrorKind::NotModified);
    }

    #[test]
    fn other_api_errors_are_generic() {
        let err = map_request_error(RequestError::Api(ApiError::ChatNotFound));
        assert_eq!(err.platform().unwrap().status, Some(400));
        assert_eq!(classify(&err), ErrorKind::Generic);
    }

    #[tokio::test]
    async fn rate_limit_is_reported_without_resending() {
        use std::sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        };

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = axum::Router::new().fallback(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                axum::Json(serde_json::json!({
                    "ok": false,
                    "error_code": 429,
                    "description": "Too Many Requests: retry after 5",
                    "parameters": {"retry_after": 5}
                }))
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let messenger = TelegramMessenger::new("123:abc", Duration::from_secs(2), 4096)
            .unwrap()
            .with_api_url(reqwest::Url::parse(&format!("http://{addr}")).unwrap());
        let started = std::time::Instant::now();
        let err = messenger
            .send_message(ChatId(1), "hi", &SendOptions::default())
            .await
            .unwrap_err();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
        let failure = err.platform().unwrap();
        assert_eq!(failure.status, Some(429));
        assert_eq!(failure.retry_after, Some(5));
        assert_eq!(classify(&err), ErrorKind::RateLimited);
    }

    #[test]
    fn builds_keyboard_rows() {
        let kb = InlineKeyboard::new(vec![
            vec![InlineButton::callback("a", "1"), InlineButton::callback("b", "2")],
            vec![InlineButton::url("docs", "https://example.com/issues")],
        ]);
        let markup = TelegramMessenger::markup(&kb).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
    }

    #[test]
    fn rejects_bad_button_url() {
        let kb = InlineKeyboard::single_row(vec![InlineButton::url("x", "not a url")]);
        assert!(matches!(
            TelegramMessenger::markup(&kb),
            Err(Error::Payload(_))
        ));
    }
}
