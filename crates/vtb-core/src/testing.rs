//! Hand-written fakes shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    analytics::AnalyticsRecord,
    domain::{ChatId, DonationId, MessageId, MessageRef, ThreadId, UserId},
    errors::{Error, PlatformFailure},
    health::{HealthDto, HealthProbe, HealthStatus},
    language::LanguageCode,
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, Invoice, MessagingCapabilities, SendOptions},
    },
    payment::PaymentService,
    ports::{AnalyticsSink, DonationStatus, RecognitionMeta, StatStore, Subscription, VoiceConverter},
    store::MemoryStore,
    Result,
};

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
    pub thread_id: Option<ThreadId>,
    pub reference: MessageRef,
}

pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sends: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<(MessageRef, String, Option<InlineKeyboard>)>>,
    deletes: Mutex<Vec<MessageRef>>,
    invoices: Mutex<Vec<Invoice>>,
    pre_checkout: Mutex<Vec<String>>,
    fail_sends: Mutex<Option<PlatformFailure>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            sends: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            invoices: Mutex::new(Vec::new()),
            pre_checkout: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(None),
        }
    }

    /// Every following `send_message` fails with `failure`.
    pub fn fail_sends(&self, failure: PlatformFailure) {
        *self.fail_sends.lock().unwrap() = Some(failure);
    }

    pub fn clear_failures(&self) {
        *self.fail_sends.lock().unwrap() = None;
    }

    pub fn sends(&self) -> Vec<SentMessage> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sends().into_iter().map(|s| s.text).collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String, Option<InlineKeyboard>)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.invoices.lock().unwrap().clone()
    }

    pub fn pre_checkout_answers(&self) -> Vec<String> {
        self.pre_checkout.lock().unwrap().clone()
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_edit: true,
            max_message_len: 4096,
        }
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: &SendOptions,
    ) -> Result<MessageRef> {
        if let Some(failure) = self.fail_sends.lock().unwrap().clone() {
            return Err(Error::Platform(failure));
        }
        let reference = self.alloc(chat_id);
        self.sends.lock().unwrap().push(SentMessage {
            chat_id,
            text: html.to_string(),
            keyboard: opts.keyboard.clone(),
            thread_id: opts.thread_id,
            reference,
        });
        Ok(reference)
    }

    async fn edit_message(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((msg, html.to_string(), keyboard.cloned()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn get_file_link(&self, file_id: &str) -> Result<String> {
        Ok(format!("https://files.example/{file_id}"))
    }

    async fn answer_pre_checkout_query(&self, query_id: &str, _error: Option<&str>) -> Result<()> {
        self.pre_checkout.lock().unwrap().push(query_id.to_string());
        Ok(())
    }

    async fn send_invoice(&self, invoice: &Invoice) -> Result<MessageRef> {
        self.invoices.lock().unwrap().push(invoice.clone());
        Ok(self.alloc(invoice.chat_id))
    }
}

/// `MemoryStore` with switchable failures.
#[derive(Default)]
pub struct FakeStore {
    inner: MemoryStore,
    fail_language_reads: Mutex<bool>,
    fail_usage: Mutex<bool>,
    fail_ignored_reads: Mutex<bool>,
}

impl FakeStore {
    pub fn fail_language_reads(&self, on: bool) {
        *self.fail_language_reads.lock().unwrap() = on;
    }

    pub fn fail_usage(&self, on: bool) {
        *self.fail_usage.lock().unwrap() = on;
    }

    pub fn fail_ignored_reads(&self, on: bool) {
        *self.fail_ignored_reads.lock().unwrap() = on;
    }

    pub fn set_ignored(&self, chat_id: ChatId) {
        self.inner.set_ignored(chat_id, true);
    }

    /// `(count, total duration)` for the chat.
    pub fn usage(&self, chat_id: ChatId) -> Option<(u64, i64)> {
        self.inner
            .usage(chat_id)
            .map(|row| (row.count, row.duration_secs))
    }

    pub fn donation(&self, id: DonationId) -> Option<DonationStatus> {
        self.inner.donation(id).map(|row| row.status)
    }

    /// `(is_active, version)` of a replica row.
    pub fn node(&self, url: &str) -> Option<(bool, String)> {
        self.inner.node(url).map(|row| (row.is_active, row.version))
    }

    fn check(flag: &Mutex<bool>, what: &str) -> Result<()> {
        if *flag.lock().unwrap() {
            return Err(Error::Store(format!("{what} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl StatStore for FakeStore {
    async fn get_language(&self, chat_id: ChatId) -> Result<Option<LanguageCode>> {
        Self::check(&self.fail_language_reads, "languages")?;
        self.inner.get_language(chat_id).await
    }

    async fn update_language(&self, chat_id: ChatId, lang: LanguageCode) -> Result<()> {
        self.inner.update_language(chat_id, lang).await
    }

    async fn increment_usage(&self, chat_id: ChatId, name: &str, duration_secs: i64) -> Result<()> {
        Self::check(&self.fail_usage, "usage")?;
        self.inner.increment_usage(chat_id, name, duration_secs).await
    }

    async fn is_chat_ignored(&self, chat_id: ChatId) -> Result<bool> {
        Self::check(&self.fail_ignored_reads, "ignored chats")?;
        self.inner.is_chat_ignored(chat_id).await
    }

    async fn create_donation(&self, chat_id: ChatId, price: u32) -> Result<DonationId> {
        self.inner.create_donation(chat_id, price).await
    }

    async fn update_donation(&self, id: DonationId, status: DonationStatus) -> Result<()> {
        self.inner.update_donation(id, status).await
    }

    async fn get_subscription(&self, user_id: UserId) -> Result<Option<Subscription>> {
        self.inner.get_subscription(user_id).await
    }

    async fn has_had_trial(&self, user_id: UserId) -> Result<bool> {
        self.inner.has_had_trial(user_id).await
    }

    async fn create_subscription(&self, sub: Subscription) -> Result<()> {
        self.inner.create_subscription(sub).await
    }

    async fn cancel_subscription(&self, user_id: UserId) -> Result<()> {
        self.inner.cancel_subscription(user_id).await
    }

    async fn update_node_state(&self, self_url: &str, is_active: bool, version: &str) -> Result<()> {
        self.inner.update_node_state(self_url, is_active, version).await
    }
}

pub struct FakeConverter {
    text: String,
    fails: bool,
    failure: Mutex<Option<Error>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    metas: Mutex<Vec<RecognitionMeta>>,
}

impl FakeConverter {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fails: false,
            failure: Mutex::new(None),
            delay: None,
            calls: Mutex::new(Vec::new()),
            metas: Mutex::new(Vec::new()),
        }
    }

    /// Fails the first call with `err`, later calls with a generic recognition error.
    pub fn failing(err: Error) -> Self {
        Self {
            fails: true,
            failure: Mutex::new(Some(err)),
            ..Self::text("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn metas(&self) -> Vec<RecognitionMeta> {
        self.metas.lock().unwrap().clone()
    }

    /// File links the converter was asked to transcribe.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceConverter for FakeConverter {
    async fn transform_to_text(
        &self,
        file_link: &str,
        _is_video: bool,
        _lang: LanguageCode,
        meta: &RecognitionMeta,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(file_link.to_string());
        self.metas.lock().unwrap().push(meta.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fails {
            let err = self.failure.lock().unwrap().take();
            return Err(err.unwrap_or_else(|| Error::Recognition("fake failure".to_string())));
        }
        Ok(self.text.clone())
    }
}

#[derive(Default)]
pub struct FakeAnalytics {
    records: Mutex<Vec<AnalyticsRecord>>,
}

impl FakeAnalytics {
    pub fn records(&self) -> Vec<AnalyticsRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalyticsSink for FakeAnalytics {
    async fn collect(&self, record: AnalyticsRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub struct StaticPayment {
    ready: bool,
}

impl StaticPayment {
    pub fn new(ready: bool) -> Self {
        Self { ready }
    }
}

impl PaymentService for StaticPayment {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn currency(&self) -> &str {
        "EUR"
    }

    fn get_link(&self, price: u32, donation_id: DonationId, lang: LanguageCode) -> Result<String> {
        Ok(format!(
            "https://pay.example/{donation_id}?amount={price}&lang={}",
            lang.short()
        ))
    }
}

/// Health probe answering from a table of webhook owners.
#[derive(Default)]
pub struct FakeProbe {
    owners: Mutex<HashMap<String, String>>,
    down: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeProbe {
    pub fn owned_by(base_url: &str) -> Self {
        let probe = Self::default();
        probe.set_owner(base_url, base_url);
        probe
    }

    /// Probing `base_url` reports webhooks registered by `owner`.
    pub fn set_owner(&self, base_url: &str, owner: &str) {
        self.owners
            .lock()
            .unwrap()
            .insert(base_url.to_string(), owner.to_string());
    }

    pub fn fail(&self, base_url: &str) {
        self.down.lock().unwrap().insert(base_url.to_string());
    }

    /// Every answer takes this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, base_url: &str) -> Result<HealthDto> {
        self.calls.lock().unwrap().push(base_url.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.lock().unwrap().contains(base_url) {
            return Err(Error::External(format!("{base_url} is unreachable")));
        }
        let owner = self
            .owners
            .lock()
            .unwrap()
            .get(base_url)
            .cloned()
            .unwrap_or_else(|| base_url.to_string());
        Ok(HealthDto {
            status: HealthStatus::Online,
            message: "ok".to_string(),
            urls: vec![format!("{owner}/bot/message/abc")],
            version: "1.2.3".to_string(),
            ssl: "off".to_string(),
        })
    }
}
