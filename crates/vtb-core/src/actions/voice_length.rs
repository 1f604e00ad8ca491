use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    actions::{Action, ActionContext},
    model::{BotMessageModel, TgMessage},
    prefix::MessagePrefix,
    text::Label,
    voice::VoiceContent,
};

/// Media without a usable duration, or at/over the duration limit.
pub struct VoiceLengthRejectAction {
    ctx: Arc<ActionContext>,
}

impl VoiceLengthRejectAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for VoiceLengthRejectAction {
    fn name(&self) -> &'static str {
        "voice length"
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        let policy = &self.ctx.settings.voice;
        let media = model.media.as_ref();
        match policy.classify(media) {
            VoiceContent::NoDuration => true,
            VoiceContent::Ok => media.is_some_and(|m| policy.is_too_long(m)),
            _ => false,
        }
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        let policy = &self.ctx.settings.voice;
        let duration = model.media.as_ref().and_then(|m| m.duration_secs);
        let no_duration = policy.classify(model.media.as_ref()) == VoiceContent::NoDuration;
        info!(%prefix, ?duration, no_duration, "voice length rejected");

        if model.is_group {
            model.analytics.add_event("voice length: skipped in group");
            return;
        }

        let lang = self.ctx.lang(model, prefix).await;
        let text = if no_duration {
            self.ctx.text.t(Label::NoContent, lang)
        } else {
            let limit = self.ctx.text.duration(policy.duration_limit_secs, lang);
            self.ctx
                .text
                .t_with(Label::LongVoiceMessage, lang, &[("duration", &limit)])
        };

        match self.ctx.send(model, &text, None).await {
            Ok(_) => model.analytics.add_event("voice length: replied"),
            Err(err) => {
                self.ctx
                    .report_failure(model, &err, "unable to send the length reply", prefix)
                    .await
            }
        }
    }
}
