//! Condition -> effect handlers and the dispatcher that routes updates to them.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    classifier::{self, ErrorKind},
    config::Config,
    domain::MessageRef,
    errors::Error,
    language::{LanguageCode, LanguageResolver},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, SendOptions},
    },
    model::{BotMessageModel, TgMessage},
    ports::StatStore,
    prefix::MessagePrefix,
    splitter,
    text::{Label, Translator},
    voice::VoicePolicy,
    Result,
};

pub mod checkout;
pub mod fallback;
pub mod dispatcher;
pub mod donate;
pub mod ignore;
pub mod language;
pub mod start;
pub mod subscription;
pub mod support;
pub mod voice;
pub mod voice_format;
pub mod voice_length;

pub use dispatcher::Dispatcher;

/// One category of update. Stateless apart from injected collaborators.
#[async_trait]
pub trait Action: Send + Sync {
    /// Analytics command name.
    fn name(&self) -> &'static str;

    fn run_condition(&self, msg: &TgMessage, model: &BotMessageModel) -> bool;

    /// Must not fail: errors are logged and tagged on `model.analytics`.
    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix);
}

/// Bot-level knobs the actions read.
#[derive(Clone, Debug)]
pub struct BotSettings {
    pub bot_name: Option<String>,
    pub message_limit: usize,
    pub author_url: Option<String>,
    pub issues_url: String,
    pub api_timeout: Duration,
    pub trial_duration_days: i64,
    pub subscription_cache_size: usize,
    pub voice: VoicePolicy,
}

impl BotSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            bot_name: cfg.telegram_bot_name.clone(),
            message_limit: cfg.telegram_message_limit,
            author_url: cfg.author_url.clone(),
            issues_url: cfg.issues_url.clone(),
            api_timeout: cfg.api_timeout,
            trial_duration_days: cfg.trial_duration_days,
            subscription_cache_size: cfg.subscription_cache_size,
            voice: VoicePolicy::new(
                cfg.voice_duration_limit_secs,
                cfg.supported_mime_types.clone(),
            ),
        }
    }
}

/// Collaborators shared by every action.
pub struct ActionContext {
    pub api: Arc<dyn MessagingPort>,
    pub store: Arc<dyn StatStore>,
    pub languages: LanguageResolver,
    pub text: Translator,
    pub settings: BotSettings,
}

impl ActionContext {
    pub fn new(api: Arc<dyn MessagingPort>, store: Arc<dyn StatStore>, settings: BotSettings) -> Self {
        Self {
            api,
            languages: LanguageResolver::new(store.clone()),
            store,
            text: Translator,
            settings,
        }
    }

    pub async fn lang(&self, model: &BotMessageModel, prefix: &MessagePrefix) -> LanguageCode {
        self.languages
            .resolve(model.chat_id, None, model.user_locale.as_deref(), prefix)
            .await
    }

    pub fn is_command(&self, model: &BotMessageModel, command: &str) -> bool {
        model.is_command(command, self.settings.bot_name.as_deref())
    }

    /// Send (possibly in several parts) into the model's chat and forum thread.
    pub async fn send(
        &self,
        model: &BotMessageModel,
        text: &str,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<Vec<MessageRef>> {
        let mut opts = SendOptions::in_thread(model.forum_thread_id);
        opts.keyboard = keyboard;
        splitter::send_text(
            self.api.as_ref(),
            model.chat_id,
            text,
            self.settings.message_limit,
            &opts,
        )
        .await
    }

    pub async fn send_label(
        &self,
        model: &BotMessageModel,
        label: Label,
        lang: LanguageCode,
        keyboard: Option<InlineKeyboard>,
    ) -> Result<Vec<MessageRef>> {
        let text = self.text.t(label, lang);
        self.send(model, &text, keyboard).await
    }

    /// Edit in place. Identical content is not an error.
    pub async fn edit(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        match self.api.edit_message(msg, text, keyboard).await {
            Err(err) if classifier::classify(&err) == ErrorKind::NotModified => Ok(()),
            other => other,
        }
    }

    /// Log, tag analytics and, in private chats, answer with a generic reply.
    pub async fn report_failure(
        &self,
        model: &BotMessageModel,
        err: &Error,
        context: &str,
        prefix: &MessagePrefix,
    ) {
        let kind = classifier::log_failure(err, context, prefix);
        if kind != ErrorKind::BlockedByRecipient {
            model.analytics.add_error(context);
        }
        if kind.should_notify(model.is_group) {
            let lang = self.lang(model, prefix).await;
            if let Err(err) = self.send_label(model, Label::GenericError, lang, None).await {
                classifier::log_failure(&err, "unable to send the failure reply", prefix);
            }
        }
    }
}
