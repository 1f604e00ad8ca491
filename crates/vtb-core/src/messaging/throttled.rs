use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, Invoice, MessagingCapabilities, SendOptions},
    },
    Result,
};

/// Idle per-chat limiters are dropped once the map grows past this.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Bot API calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls to one private chat.
    pub private_min_interval: Duration,
    /// Groups are limited to ~20 messages per minute.
    pub group_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            private_min_interval: Duration::from_millis(1050),
            group_min_interval: Duration::from_millis(3000),
        }
    }
}

#[derive(Debug)]
struct Slot {
    interval: Duration,
    next: Instant,
}

impl Slot {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Book the next slot; returns how long the caller has to wait for it.
    fn book(&mut self) -> Duration {
        let now = Instant::now();
        let start = self.next.max(now);
        self.next = start + self.interval;
        start - now
    }

    fn hold_until(&mut self, at: Instant) {
        self.next = self.next.max(at);
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.next <= now
    }
}

/// MessagingPort decorator that spaces outbound calls per chat and globally.
///
/// A 429 from the platform that carries `retry_after` also pushes back the
/// next slot for that chat; the error itself is still returned to the caller.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<Slot>,
    chats: Mutex<HashMap<ChatId, Slot>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(Slot::new(cfg.global_min_interval)),
            chats: Mutex::new(HashMap::new()),
        }
    }

    fn interval_for(&self, chat_id: ChatId) -> Duration {
        // Negative ids are groups, supergroups and channels.
        if chat_id.0 < 0 {
            self.cfg.group_min_interval
        } else {
            self.cfg.private_min_interval
        }
    }

    async fn wait_turn(&self, chat_id: Option<ChatId>) {
        let global_wait = self.global.lock().await.book();
        let chat_wait = match chat_id {
            Some(chat_id) => {
                let mut chats = self.chats.lock().await;
                if chats.len() > PRUNE_THRESHOLD {
                    let now = Instant::now();
                    chats.retain(|_, slot| !slot.is_idle(now));
                }
                chats
                    .entry(chat_id)
                    .or_insert_with(|| Slot::new(self.interval_for(chat_id)))
                    .book()
            }
            None => Duration::ZERO,
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn observe<T>(&self, chat_id: ChatId, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if let Some(secs) = err.platform().and_then(|p| p.retry_after) {
                warn!(%chat_id, retry_after_secs = secs, "platform asked to slow down");
                let until = Instant::now() + Duration::from_secs(secs);
                self.chats
                    .lock()
                    .await
                    .entry(chat_id)
                    .or_insert_with(|| Slot::new(self.interval_for(chat_id)))
                    .hold_until(until);
            }
        }
        result
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: &SendOptions,
    ) -> Result<MessageRef> {
        self.wait_turn(Some(chat_id)).await;
        let result = self.inner.send_message(chat_id, html, opts).await;
        self.observe(chat_id, result).await
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.wait_turn(Some(msg.chat_id)).await;
        let result = self.inner.edit_message(msg, html, keyboard).await;
        self.observe(msg.chat_id, result).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.wait_turn(Some(msg.chat_id)).await;
        let result = self.inner.delete_message(msg).await;
        self.observe(msg.chat_id, result).await
    }

    async fn get_file_link(&self, file_id: &str) -> Result<String> {
        self.wait_turn(None).await;
        self.inner.get_file_link(file_id).await
    }

    async fn answer_pre_checkout_query(&self, query_id: &str, error: Option<&str>) -> Result<()> {
        // Must be answered within 10 seconds; global spacing only.
        self.wait_turn(None).await;
        self.inner.answer_pre_checkout_query(query_id, error).await
    }

    async fn send_invoice(&self, invoice: &Invoice) -> Result<MessageRef> {
        self.wait_turn(Some(invoice.chat_id)).await;
        let result = self.inner.send_invoice(invoice).await;
        self.observe(invoice.chat_id, result).await
    }
}
