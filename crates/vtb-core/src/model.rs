//! Inbound webhook schema and the canonical message model built from it.
//!
//! Only the fields the bot reads are modelled; serde ignores the rest, so
//! Bot API additions never break ingress.

use serde::{Deserialize, Serialize};

use crate::{
    analytics::AnalyticsData,
    domain::{ChatId, DonationId, MessageId, ThreadId, UserId},
    errors::Error,
    Result,
};

#[derive(Clone, Debug, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub callback_query: Option<TgCallbackQuery>,
    #[serde(default)]
    pub pre_checkout_query: Option<TgPreCheckoutQuery>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TgMessage {
    pub message_id: i32,
    #[serde(default)]
    pub message_thread_id: Option<i32>,
    #[serde(default)]
    pub is_topic_message: Option<bool>,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<TgAudioFile>,
    #[serde(default)]
    pub audio: Option<TgAudioFile>,
    #[serde(default)]
    pub video_note: Option<TgAudioFile>,
    #[serde(default)]
    pub successful_payment: Option<TgSuccessfulPayment>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Voice, audio and video-note payloads share the fields the bot needs.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TgAudioFile {
    pub file_id: String,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TgSuccessfulPayment {
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
    #[serde(default)]
    pub telegram_payment_charge_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgUser,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TgPreCheckoutQuery {
    pub id: String,
    pub from: TgUser,
    pub currency: String,
    pub total_amount: i64,
    pub invoice_payload: String,
}

/// One inbound event, as the dispatcher sees it.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Message(TgMessage),
    CallbackQuery(TgCallbackQuery),
    PreCheckoutQuery(TgPreCheckoutQuery),
    /// Edited messages, channel posts, etc. Acknowledged and dropped.
    Unsupported { update_id: i64 },
}

impl IncomingUpdate {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let update: TgUpdate = serde_json::from_slice(body)?;
        Ok(update.into())
    }
}

impl From<TgUpdate> for IncomingUpdate {
    fn from(u: TgUpdate) -> Self {
        if let Some(msg) = u.message {
            IncomingUpdate::Message(msg)
        } else if let Some(q) = u.callback_query {
            IncomingUpdate::CallbackQuery(q)
        } else if let Some(q) = u.pre_checkout_query {
            IncomingUpdate::PreCheckoutQuery(q)
        } else {
            IncomingUpdate::Unsupported {
                update_id: u.update_id,
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
    Other,
}

impl ChatType {
    fn parse(kind: &str) -> Self {
        match kind {
            "private" => ChatType::Private,
            "group" => ChatType::Group,
            "supergroup" => ChatType::Supergroup,
            "channel" => ChatType::Channel,
            _ => ChatType::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Voice,
    Audio,
    VideoNote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaInfo {
    pub kind: MediaKind,
    pub file_id: String,
    pub duration_secs: Option<i64>,
    pub mime_type: Option<String>,
}

impl MediaInfo {
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::VideoNote
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentInfo {
    pub donation_id: Option<DonationId>,
    pub charge_id: String,
    pub amount: i64,
    pub currency: String,
}

/// Invoice payload echoed back by the platform: `{"d":1,"c":42,"i":"k3JdX9aQ0b"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePayload {
    #[serde(rename = "d")]
    pub donation_id: DonationId,
    #[serde(rename = "c")]
    pub chat_id: ChatId,
    #[serde(rename = "i")]
    pub correlation_id: String,
}

impl InvoicePayload {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Payload(format!("invalid invoice payload {raw:?}: {e}")))
    }
}

/// Read-only view of a message used by every action.
#[derive(Debug)]
pub struct BotMessageModel {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub chat_type: ChatType,
    pub is_group: bool,
    pub user_id: Option<UserId>,
    pub from_bot: bool,
    pub user_name: String,
    pub full_user_name: String,
    pub group_name: String,
    pub user_locale: Option<String>,
    pub text: Option<String>,
    pub media: Option<MediaInfo>,
    pub payment: Option<PaymentInfo>,
    pub forum_thread_id: Option<ThreadId>,
    pub analytics: AnalyticsData,
}

impl BotMessageModel {
    pub fn new(msg: &TgMessage) -> Self {
        let chat_type = ChatType::parse(&msg.chat.kind);
        let full_user_name = msg
            .from
            .as_ref()
            .map(|u| join_name(Some(&u.first_name), u.last_name.as_deref()))
            .unwrap_or_default();
        let group_name = msg
            .chat
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                join_name(msg.chat.first_name.as_deref(), msg.chat.last_name.as_deref())
            });
        let user_name = msg
            .from
            .as_ref()
            .and_then(|u| u.username.clone())
            .filter(|u| !u.is_empty())
            .or_else(|| Some(full_user_name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| group_name.clone());
        let user_locale = msg.from.as_ref().and_then(|u| u.language_code.clone());

        let media = media_of(msg);
        let payment = msg.successful_payment.as_ref().map(|p| PaymentInfo {
            donation_id: InvoicePayload::decode(&p.invoice_payload)
                .ok()
                .map(|payload| payload.donation_id),
            charge_id: p.telegram_payment_charge_id.clone(),
            amount: p.total_amount,
            currency: p.currency.clone(),
        });
        let forum_thread_id = match (msg.is_topic_message, msg.message_thread_id) {
            (Some(true), Some(id)) => Some(ThreadId(id)),
            _ => None,
        };

        let chat_id = ChatId(msg.chat.id);
        Self {
            id: MessageId(msg.message_id),
            chat_id,
            chat_type,
            is_group: matches!(chat_type, ChatType::Group | ChatType::Supergroup),
            user_id: msg.from.as_ref().map(|u| UserId(u.id)),
            from_bot: msg.from.as_ref().is_some_and(|u| u.is_bot),
            user_name,
            full_user_name,
            group_name,
            analytics: AnalyticsData::new(chat_id, user_locale.clone()),
            user_locale,
            text: msg.text.clone(),
            media,
            payment,
            forum_thread_id,
        }
    }

    /// Model of the message a button was attached to, seen from the clicker.
    pub fn from_callback(query: &TgCallbackQuery) -> Option<Self> {
        let mut msg = query.message.clone()?;
        msg.from = Some(query.from.clone());
        let mut model = Self::new(&msg);
        model.from_bot = false;
        Some(model)
    }

    /// Chat display name: group title in groups, user name otherwise.
    pub fn name(&self) -> &str {
        if self.is_group {
            &self.group_name
        } else {
            &self.user_name
        }
    }

    /// Name used to attribute a transcription in group chats.
    pub fn sender_name(&self) -> &str {
        if self.full_user_name.is_empty() {
            &self.user_name
        } else {
            &self.full_user_name
        }
    }

    /// Messages from bots and channel posts are never dispatched.
    pub fn is_supported(&self) -> bool {
        !self.from_bot && !matches!(self.chat_type, ChatType::Channel | ChatType::Other)
    }

    /// `/cmd`, or `/cmd@bot_name` (case-insensitive) in groups.
    pub fn is_command(&self, command: &str, bot_name: Option<&str>) -> bool {
        let Some(first) = self.text.as_deref().and_then(|t| t.split_whitespace().next()) else {
            return false;
        };
        if first == command {
            return true;
        }
        if !self.is_group {
            return false;
        }
        match (first.split_once('@'), bot_name) {
            (Some((cmd, name)), Some(bot)) => cmd == command && name.eq_ignore_ascii_case(bot),
            _ => false,
        }
    }
}

fn join_name(first: Option<&str>, last: Option<&str>) -> String {
    [first, last]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn media_of(msg: &TgMessage) -> Option<MediaInfo> {
    let (kind, file) = if let Some(v) = &msg.voice {
        (MediaKind::Voice, v)
    } else if let Some(a) = &msg.audio {
        (MediaKind::Audio, a)
    } else if let Some(v) = &msg.video_note {
        (MediaKind::VideoNote, v)
    } else {
        return None;
    };
    Some(MediaInfo {
        kind,
        file_id: file.file_id.clone(),
        duration_secs: file.duration,
        mime_type: file.mime_type.clone(),
    })
}
