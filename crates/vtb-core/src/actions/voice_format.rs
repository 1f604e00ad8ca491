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

/// Media with a mime type outside the allow-list.
pub struct VoiceFormatRejectAction {
    ctx: Arc<ActionContext>,
}

impl VoiceFormatRejectAction {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }

    fn formats(&self) -> String {
        self.ctx.settings.voice.supported_mime_types.join(", ")
    }
}

#[async_trait]
impl Action for VoiceFormatRejectAction {
    fn name(&self) -> &'static str {
        "voice format"
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.settings.voice.classify(model.media.as_ref()) == VoiceContent::WrongMimeType
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        let mime = model.media.as_ref().and_then(|m| m.mime_type.as_deref());
        info!(%prefix, ?mime, "unsupported audio format");

        if model.is_group {
            model.analytics.add_event("voice format: skipped in group");
            return;
        }

        let lang = self.ctx.lang(model, prefix).await;
        let text = format!(
            "{}\n\n{}",
            self.ctx.text.t(Label::AudioNotSupported, lang),
            self.ctx
                .text
                .t_with(Label::SupportedFormats, lang, &[("formats", &self.formats())]),
        );
        match self.ctx.send(model, &text, None).await {
            Ok(_) => model.analytics.add_event("voice format: replied"),
            Err(err) => {
                self.ctx
                    .report_failure(model, &err, "unable to send the format reply", prefix)
                    .await
            }
        }
    }
}
