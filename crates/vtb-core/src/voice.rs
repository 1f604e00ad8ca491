//! Voice content policy and the recognition orchestrator.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{error, info, warn};

use crate::{
    classifier::{self, ErrorKind},
    errors::Error,
    language::LanguageCode,
    messaging::{port::MessagingPort, types::SendOptions},
    model::{BotMessageModel, MediaInfo},
    ports::{RecognitionMeta, StatStore, VoiceConverter},
    prefix::MessagePrefix,
    splitter,
    text::{Label, Translator},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceContent {
    Ok,
    NoContent,
    NoDuration,
    WrongMimeType,
}

#[derive(Clone, Debug)]
pub struct VoicePolicy {
    pub duration_limit_secs: u32,
    /// Lowercased mime types without parameters.
    pub supported_mime_types: Vec<String>,
}

impl VoicePolicy {
    pub fn new(duration_limit_secs: u32, supported_mime_types: Vec<String>) -> Self {
        Self {
            duration_limit_secs,
            supported_mime_types: supported_mime_types
                .into_iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Mime type is checked before duration. A missing mime type is accepted
    /// (Telegram omits it for video notes).
    pub fn classify(&self, media: Option<&MediaInfo>) -> VoiceContent {
        let Some(media) = media else {
            return VoiceContent::NoContent;
        };
        if let Some(mime) = media.mime_type.as_deref() {
            let essence = mime.split(';').next().unwrap_or_default().trim();
            if !self
                .supported_mime_types
                .iter()
                .any(|m| m.eq_ignore_ascii_case(essence))
            {
                return VoiceContent::WrongMimeType;
            }
        }
        match media.duration_secs {
            Some(d) if d > 0 => VoiceContent::Ok,
            _ => VoiceContent::NoDuration,
        }
    }

    /// Inclusive: a duration equal to the limit is too long.
    pub fn is_too_long(&self, media: &MediaInfo) -> bool {
        media
            .duration_secs
            .is_some_and(|d| d >= i64::from(self.duration_limit_secs))
    }

    /// `Ok` and within the limit: the only case that reaches a provider.
    pub fn is_recognizable(&self, media: Option<&MediaInfo>) -> bool {
        self.classify(media) == VoiceContent::Ok && media.is_some_and(|m| !self.is_too_long(m))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoiceOutcome {
    Transcribed { parts: usize },
    Empty,
    Failed(ErrorKind),
}

/// Bound a third-party call by the configured budget.
pub async fn with_timeout<T>(
    budget: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(format!("{what} exceeded {}ms", budget.as_millis()))),
    }
}

pub struct VoiceOrchestrator {
    api: Arc<dyn MessagingPort>,
    converter: Arc<dyn VoiceConverter>,
    store: Arc<dyn StatStore>,
    text: Translator,
    api_timeout: Duration,
    message_limit: usize,
}

impl VoiceOrchestrator {
    pub fn new(
        api: Arc<dyn MessagingPort>,
        converter: Arc<dyn VoiceConverter>,
        store: Arc<dyn StatStore>,
        api_timeout: Duration,
        message_limit: usize,
    ) -> Self {
        Self {
            api,
            converter,
            store,
            text: Translator,
            api_timeout,
            message_limit,
        }
    }

    /// Run recognition for an already-validated media message.
    ///
    /// Never fails: every error is classified, logged and (outside groups)
    /// answered with a short generic reply.
    pub async fn recognize(
        &self,
        model: &BotMessageModel,
        media: &MediaInfo,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> VoiceOutcome {
        info!(%prefix, duration_secs = ?media.duration_secs, "processing voice");

        let link = with_timeout(
            self.api_timeout,
            "getFileLink",
            self.api.get_file_link(&media.file_id),
        )
        .await;

        let (placeholder, result) = match link {
            Ok(link) => {
                let meta = RecognitionMeta {
                    file_id: media.file_id.clone(),
                    duration_secs: media.duration_secs.unwrap_or_default(),
                    mime_type: media.mime_type.clone(),
                    log_prefix: prefix.to_string(),
                };
                tokio::join!(
                    self.send_placeholder(model, lang, prefix),
                    with_timeout(
                        self.api_timeout,
                        "recognition",
                        self.converter
                            .transform_to_text(&link, media.is_video(), lang, &meta),
                    )
                )
            }
            Err(err) => (None, Err(err)),
        };

        let outcome = match result {
            Ok(text) if !text.trim().is_empty() => self.send_transcription(model, &text, prefix).await,
            Ok(_) => {
                info!(%prefix, "nothing recognized");
                model.analytics.add_event("voice: empty");
                self.reply(model, Label::RecognitionEmpty, lang, prefix).await;
                VoiceOutcome::Empty
            }
            Err(err) => self.handle_failure(model, &err, lang, prefix).await,
        };

        if let Some(msg) = placeholder {
            if let Err(err) = self.api.delete_message(msg).await {
                classifier::log_failure(&err, "unable to delete the in-progress message", prefix);
            }
        }

        self.update_usage(model, media, prefix).await;
        outcome
    }

    async fn send_placeholder(
        &self,
        model: &BotMessageModel,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> Option<crate::domain::MessageRef> {
        if model.is_group {
            return None;
        }
        let opts = SendOptions::in_thread(model.forum_thread_id);
        let text = self.text.t(Label::InProgress, lang);
        match with_timeout(
            self.api_timeout,
            "sendMessage",
            self.api.send_message(model.chat_id, &text, &opts),
        )
        .await
        {
            Ok(msg) => Some(msg),
            Err(err) => {
                classifier::log_failure(&err, "unable to send the in-progress message", prefix);
                None
            }
        }
    }

    async fn send_transcription(
        &self,
        model: &BotMessageModel,
        text: &str,
        prefix: &MessagePrefix,
    ) -> VoiceOutcome {
        let body = if model.is_group && !model.sender_name().is_empty() {
            format!("{} 🗣 {}", model.sender_name(), text.trim())
        } else {
            format!("🗣 {}", text.trim())
        };
        let opts = SendOptions::in_thread(model.forum_thread_id).plain();

        match splitter::send_text(
            self.api.as_ref(),
            model.chat_id,
            &body,
            self.message_limit,
            &opts,
        )
        .await
        {
            Ok(sent) => {
                info!(%prefix, parts = sent.len(), "voice successfully converted");
                model.analytics.add_event("voice: converted");
                VoiceOutcome::Transcribed { parts: sent.len() }
            }
            Err(err) => {
                let kind = classifier::log_failure(&err, "unable to send the transcription", prefix);
                model.analytics.add_error(kind.as_str());
                VoiceOutcome::Failed(kind)
            }
        }
    }

    async fn handle_failure(
        &self,
        model: &BotMessageModel,
        err: &Error,
        lang: LanguageCode,
        prefix: &MessagePrefix,
    ) -> VoiceOutcome {
        let kind = classifier::classify(err);
        match kind {
            ErrorKind::BlockedByRecipient => {
                warn!(%prefix, "bot was blocked by the user while recognizing");
            }
            _ => {
                error!(%prefix, file_id = %model.media.as_ref().map(|m| m.file_id.as_str()).unwrap_or_default(), "unable to recognize the file: {err}");
                model.analytics.add_error(&format!("recognition: {}", kind.as_str()));
            }
        }
        if kind.should_notify(model.is_group) {
            self.reply(model, Label::RecognitionFailed, lang, prefix).await;
        }
        VoiceOutcome::Failed(kind)
    }

    async fn reply(&self, model: &BotMessageModel, label: Label, lang: LanguageCode, prefix: &MessagePrefix) {
        let opts = SendOptions::in_thread(model.forum_thread_id);
        let text = self.text.t(label, lang);
        if let Err(err) = self.api.send_message(model.chat_id, &text, &opts).await {
            classifier::log_failure(&err, "unable to send reply", prefix);
        }
    }

    async fn update_usage(&self, model: &BotMessageModel, media: &MediaInfo, prefix: &MessagePrefix) {
        let duration = media.duration_secs.unwrap_or_default();
        match self
            .store
            .increment_usage(model.chat_id, model.name(), duration)
            .await
        {
            Ok(()) => info!(%prefix, "usage count updated"),
            Err(err) => error!(%prefix, "unable to update usage count: {err}"),
        }
    }
}
