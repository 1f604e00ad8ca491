use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    actions::{Action, ActionContext},
    model::{BotMessageModel, TgMessage},
    prefix::MessagePrefix,
    ports::VoiceConverter,
    voice::{VoiceOrchestrator, VoiceOutcome},
};

pub struct VoiceAction {
    ctx: Arc<ActionContext>,
    orchestrator: VoiceOrchestrator,
}

impl VoiceAction {
    pub fn new(ctx: Arc<ActionContext>, converter: Arc<dyn VoiceConverter>) -> Self {
        let orchestrator = VoiceOrchestrator::new(
            ctx.api.clone(),
            converter,
            ctx.store.clone(),
            ctx.settings.api_timeout,
            ctx.settings.message_limit,
        );
        Self { ctx, orchestrator }
    }
}

#[async_trait]
impl Action for VoiceAction {
    fn name(&self) -> &'static str {
        "voice"
    }

    fn run_condition(&self, _msg: &TgMessage, model: &BotMessageModel) -> bool {
        self.ctx.settings.voice.is_recognizable(model.media.as_ref())
    }

    async fn run_action(&self, model: &BotMessageModel, prefix: &MessagePrefix) {
        let Some(media) = model.media.as_ref() else {
            return;
        };
        let lang = self.ctx.lang(model, prefix).await;
        let outcome = self.orchestrator.recognize(model, media, lang, prefix).await;
        if let VoiceOutcome::Failed(kind) = outcome {
            model.analytics.add_event(&format!("voice failed: {}", kind.as_str()));
        }
    }
}
