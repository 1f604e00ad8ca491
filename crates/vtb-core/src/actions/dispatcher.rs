use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    actions::{
        checkout::CheckoutAction, donate::DonateAction, fallback::CoreAction,
        ignore::IgnoreAction, language::LanguageAction, start::StartAction,
        subscription::SubscriptionAction, support::SupportAction, voice::VoiceAction,
        voice_format::VoiceFormatRejectAction, voice_length::VoiceLengthRejectAction, Action,
        ActionContext,
    },
    analytics::AnalyticsData,
    button::{ButtonKind, ButtonState},
    domain::ChatId,
    model::{BotMessageModel, IncomingUpdate, TgCallbackQuery, TgMessage, TgPreCheckoutQuery},
    payment::PaymentService,
    ports::{AnalyticsSink, VoiceConverter},
    prefix::MessagePrefix,
};

/// Routes one update to at most one action. Never fails.
pub struct Dispatcher {
    ignore: IgnoreAction,
    /// Priority order; the first matching condition wins.
    actions: Vec<Arc<dyn Action>>,
    fallback: CoreAction,
    language: Arc<LanguageAction>,
    donate: Arc<DonateAction>,
    subscription: Arc<SubscriptionAction>,
    checkout: Arc<CheckoutAction>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl Dispatcher {
    pub fn new(
        ctx: Arc<ActionContext>,
        converter: Arc<dyn VoiceConverter>,
        payment: Arc<dyn PaymentService>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        let language = Arc::new(LanguageAction::new(ctx.clone()));
        let donate = Arc::new(DonateAction::new(ctx.clone(), payment));
        let subscription = Arc::new(SubscriptionAction::new(ctx.clone()));
        let checkout = Arc::new(CheckoutAction::new(ctx.clone()));

        let actions: Vec<Arc<dyn Action>> = vec![
            Arc::new(StartAction::new(ctx.clone())),
            language.clone(),
            Arc::new(SupportAction::new(ctx.clone())),
            donate.clone(),
            subscription.clone(),
            Arc::new(VoiceFormatRejectAction::new(ctx.clone())),
            Arc::new(VoiceLengthRejectAction::new(ctx.clone())),
            Arc::new(VoiceAction::new(ctx.clone(), converter)),
            checkout.clone(),
        ];

        Self {
            ignore: IgnoreAction::new(ctx.store.clone()),
            actions,
            fallback: CoreAction,
            language,
            donate,
            subscription,
            checkout,
            analytics,
        }
    }

    pub async fn dispatch(&self, update: IncomingUpdate) {
        match update {
            IncomingUpdate::Message(msg) => self.handle_message(&msg).await,
            IncomingUpdate::CallbackQuery(query) => self.handle_callback(&query).await,
            IncomingUpdate::PreCheckoutQuery(query) => self.handle_pre_checkout(&query).await,
            IncomingUpdate::Unsupported { update_id } => {
                info!(update_id, "skipping unsupported update");
            }
        }
    }

    async fn handle_message(&self, msg: &TgMessage) {
        let model = BotMessageModel::new(msg);
        let prefix = MessagePrefix::new(model.chat_id);

        if !model.is_supported() {
            warn!(%prefix, chat_type = ?model.chat_type, from_bot = model.from_bot, "message is not supported");
            model.analytics.add_event("unsupported message");
        } else if self.ignore.is_ignored(model.chat_id, &prefix).await {
            model.analytics.set_command(self.ignore.name());
            self.ignore.run_action(&model, &prefix).await;
        } else {
            let action: &dyn Action = match self.actions.iter().find(|a| a.run_condition(msg, &model)) {
                Some(action) => action.as_ref(),
                None => &self.fallback,
            };
            model.analytics.set_command(action.name());
            action.run_action(&model, &prefix).await;
        }

        self.analytics.collect(model.analytics.record()).await;
    }

    async fn handle_callback(&self, query: &TgCallbackQuery) {
        let Some(model) = BotMessageModel::from_callback(query) else {
            error!(query_id = %query.id, "callback query without a message");
            let analytics = AnalyticsData::new(ChatId(query.from.id), query.from.language_code.clone());
            analytics.add_error("callback without message");
            self.analytics.collect(analytics.record()).await;
            return;
        };

        let button = ButtonState::decode(query.data.as_deref().unwrap_or_default());
        let prefix = if button.is_unknown() {
            MessagePrefix::new(model.chat_id)
        } else {
            MessagePrefix::resume(model.chat_id, button.correlation_id.clone())
        };
        info!(%prefix, kind = button.kind.as_str(), "button clicked");

        match button.kind {
            ButtonKind::Donation => self.donate.run_callback(&model, &button, &prefix).await,
            ButtonKind::Language => self.language.run_callback(&model, &button, &prefix).await,
            ButtonKind::Subscription => {
                self.subscription
                    .run_callback(&model, &button, &prefix)
                    .await
            }
            ButtonKind::Unknown => {
                error!(%prefix, data = ?query.data, "unknown button payload");
                model.analytics.set_command("callback");
                model.analytics.add_error("unknown button");
            }
        }

        self.analytics.collect(model.analytics.record()).await;
    }

    async fn handle_pre_checkout(&self, query: &TgPreCheckoutQuery) {
        let analytics = AnalyticsData::new(ChatId(query.from.id), query.from.language_code.clone());
        self.checkout.confirm_checkout(query, &analytics).await;
        self.analytics.collect(analytics.record()).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::{
        prefix::CorrelationId,
        actions::BotSettings,
        domain::{MessageId, MessageRef, UserId},
        language::LanguageCode,
        messaging::types::ButtonKind as UiButton,
        model::InvoicePayload,
        ports::{DonationStatus, StatStore, Subscription},
        testing::{FakeAnalytics, FakeConverter, FakeMessenger, FakeStore, StaticPayment},
        voice::VoicePolicy,
    };

    struct Harness {
        api: Arc<FakeMessenger>,
        store: Arc<FakeStore>,
        converter: Arc<FakeConverter>,
        analytics: Arc<FakeAnalytics>,
        dispatcher: Dispatcher,
    }

    fn settings() -> BotSettings {
        BotSettings {
            bot_name: Some("VoiceBot".to_string()),
            message_limit: 4096,
            author_url: Some("https://t.me/author".to_string()),
            issues_url: "https://example.com/issues".to_string(),
            api_timeout: Duration::from_secs(10),
            trial_duration_days: 7,
            subscription_cache_size: 10,
            voice: VoicePolicy::new(90, vec!["audio/ogg".to_string(), "audio/mpeg".to_string()]),
        }
    }

    fn harness_with(converter: FakeConverter, payment_ready: bool) -> Harness {
        let api = Arc::new(FakeMessenger::new());
        let store = Arc::new(FakeStore::default());
        let converter = Arc::new(converter);
        let analytics = Arc::new(FakeAnalytics::default());
        let ctx = Arc::new(ActionContext::new(api.clone(), store.clone(), settings()));
        let dispatcher = Dispatcher::new(
            ctx,
            converter.clone(),
            Arc::new(StaticPayment::new(payment_ready)),
            analytics.clone(),
        );
        Harness {
            api,
            store,
            converter,
            analytics,
            dispatcher,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeConverter::text("supergroup"), true)
    }

    fn update(json: &str) -> IncomingUpdate {
        IncomingUpdate::parse(json.as_bytes()).unwrap()
    }

    fn text_message(chat_type: &str, chat_id: i64, text: &str) -> IncomingUpdate {
        update(&format!(
            r#"{{"update_id":1,"message":{{"message_id":10,
                "from":{{"id":5,"first_name":"Ann","last_name":"Lee","language_code":"en"}},
                "chat":{{"id":{chat_id},"type":"{chat_type}","title":"Team"}},
                "text":"{text}"}}}}"#
        ))
    }

    fn voice_message(chat_type: &str, chat_id: i64, duration: i64, mime: &str) -> IncomingUpdate {
        update(&format!(
            r#"{{"update_id":1,"message":{{"message_id":10,
                "from":{{"id":5,"first_name":"Ann","last_name":"Lee","language_code":"en"}},
                "chat":{{"id":{chat_id},"type":"{chat_type}","title":"Team"}},
                "voice":{{"file_id":"F1","duration":{duration},"mime_type":"{mime}"}}}}}}"#
        ))
    }

    fn callback(chat_id: i64, message_id: i32, data: &str) -> IncomingUpdate {
        let data = serde_json::to_string(data).unwrap();
        update(&format!(
            r#"{{"update_id":2,"callback_query":{{"id":"q","data":{data},
                "from":{{"id":5,"first_name":"Ann","language_code":"en"}},
                "message":{{"message_id":{message_id},"chat":{{"id":{chat_id},"type":"private"}}}}}}}}"#
        ))
    }

    fn button_data(api: &FakeMessenger, send_idx: usize, button_idx: usize) -> String {
        let send = &api.sends()[send_idx];
        let keyboard = send.keyboard.as_ref().unwrap();
        let buttons: Vec<_> = keyboard.rows.iter().flatten().collect();
        match &buttons[button_idx].kind {
            UiButton::Callback(data) => data.clone(),
            UiButton::Url(url) => panic!("expected a callback button, got {url}"),
        }
    }

    #[tokio::test]
    async fn start_sends_four_messages_in_order() {
        let h = harness();
        h.dispatcher.dispatch(text_message("private", 5, "/start")).await;

        assert_eq!(
            h.api.sent_texts(),
            vec![
                "👋🏽 Hey there! Send me a voice message and I will show what they are talking about in plain text",
                "You can add me to a group so I will convert voice messages from all the participants!\n\nEven better, I can recognise video notes (Telegram video circles) as well 🎉",
                "Do not forget to select the language you want to recognise by typing the /lang command",
                "Support this project. Run /donate command for details",
            ]
        );
        let records = h.analytics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].command, "/start");
    }

    #[tokio::test]
    async fn private_voice_scenario() {
        let h = harness();
        h.dispatcher
            .dispatch(voice_message("private", 5, 89, "audio/ogg"))
            .await;

        let sends = h.api.sends();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0].text, "🎙 Processing voice message");
        assert!(sends[1].text.contains("supergroup"));
        assert_eq!(h.api.deleted(), vec![sends[0].reference]);
        assert_eq!(h.store.usage(ChatId(5)), Some((1, 89)));
        assert_eq!(h.converter.calls().len(), 1);
    }

    #[tokio::test]
    async fn group_voice_scenario() {
        let h = harness();
        h.dispatcher
            .dispatch(voice_message("group", -20, 89, "audio/ogg"))
            .await;

        assert_eq!(h.api.sent_texts(), vec!["Ann Lee 🗣 supergroup"]);
        assert!(h.api.deleted().is_empty());
        assert!(h.analytics.records()[0].errors.is_empty());
    }

    #[tokio::test]
    async fn ignored_chat_gets_no_reply() {
        let h = harness();
        h.store.set_ignored(ChatId(5));
        h.dispatcher.dispatch(text_message("private", 5, "/start")).await;
        h.dispatcher
            .dispatch(voice_message("private", 5, 10, "audio/ogg"))
            .await;

        assert!(h.api.sends().is_empty());
        assert!(h.converter.calls().is_empty());
        assert_eq!(h.analytics.records()[0].command, "ignore");
    }

    #[tokio::test]
    async fn ignore_lookup_failure_is_not_ignored() {
        let h = harness();
        h.store.set_ignored(ChatId(5));
        h.store.fail_ignored_reads(true);
        h.dispatcher.dispatch(text_message("private", 5, "/start")).await;

        assert_eq!(h.api.sends().len(), 4);
    }

    #[tokio::test]
    async fn voice_at_the_limit_is_rejected_with_duration() {
        let h = harness();
        h.dispatcher
            .dispatch(voice_message("private", 5, 90, "audio/ogg"))
            .await;

        assert_eq!(
            h.api.sent_texts(),
            vec!["I do not support messages longer than 1 min 30 sec at the moment 🌚"]
        );
        assert!(h.converter.calls().is_empty());
        assert_eq!(h.analytics.records()[0].command, "voice length");
    }

    #[tokio::test]
    async fn wrong_mime_is_rejected_in_private_and_skipped_in_groups() {
        let h = harness();
        h.dispatcher
            .dispatch(voice_message("private", 5, 10, "audio/wav"))
            .await;
        let sent = h.api.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("The audio file format is not supported"));
        assert!(sent[0].contains("audio/ogg, audio/mpeg"));

        let h = harness();
        h.dispatcher
            .dispatch(voice_message("group", -20, 10, "audio/wav"))
            .await;
        assert!(h.api.sends().is_empty());
        let record = &h.analytics.records()[0];
        assert_eq!(record.command, "voice format");
        assert_eq!(record.events, vec!["voice format: skipped in group"]);
    }

    #[tokio::test]
    async fn missing_duration_is_no_content() {
        let h = harness();
        h.dispatcher
            .dispatch(voice_message("private", 5, 0, "audio/ogg"))
            .await;
        assert_eq!(
            h.api.sent_texts(),
            vec!["No voice track found in the message 🌚"]
        );
    }

    #[tokio::test]
    async fn plain_text_runs_fallback_only() {
        let h = harness();
        h.dispatcher.dispatch(text_message("private", 5, "hello")).await;

        assert!(h.api.sends().is_empty());
        assert_eq!(h.analytics.records()[0].command, "no content");
    }

    #[tokio::test]
    async fn group_commands_need_matching_bot_name() {
        let h = harness();
        h.dispatcher
            .dispatch(text_message("group", -20, "/support@OtherBot"))
            .await;
        assert!(h.api.sends().is_empty());

        h.dispatcher
            .dispatch(text_message("group", -20, "/support@voicebot"))
            .await;
        let sends = h.api.sends();
        assert_eq!(sends.len(), 1);
        let buttons: Vec<_> = sends[0].keyboard.as_ref().unwrap().rows.concat();
        assert_eq!(buttons.len(), 2);
    }

    #[tokio::test]
    async fn bot_messages_are_not_dispatched() {
        let h = harness();
        h.dispatcher
            .dispatch(update(
                r#"{"update_id":1,"message":{"message_id":1,
                    "from":{"id":9,"is_bot":true,"first_name":"B"},
                    "chat":{"id":9,"type":"private"},"text":"/start"}}"#,
            ))
            .await;
        assert!(h.api.sends().is_empty());
        assert_eq!(h.analytics.records()[0].events, vec!["unsupported message"]);
    }

    #[tokio::test]
    async fn language_button_round_trip_keeps_correlation() {
        let h = harness();
        h.dispatcher.dispatch(text_message("private", 5, "/lang")).await;
        let data = button_data(&h.api, 0, 1);
        let sent_corr = ButtonState::decode(&data).correlation_id;
        assert!(!sent_corr.as_str().is_empty());

        let selector = h.api.sends()[0].reference;
        h.dispatcher
            .dispatch(callback(5, selector.message_id.0, &data))
            .await;

        assert_eq!(
            h.store.get_language(ChatId(5)).await.unwrap(),
            Some(LanguageCode::Ru)
        );
        assert_eq!(
            h.api.edits(),
            vec![(selector, "Язык изменен 🆗".to_string(), None)]
        );
        assert_eq!(h.analytics.records()[1].command, "/lang");
    }

    #[tokio::test]
    async fn stale_button_is_logged_not_crashed() {
        let h = harness();
        h.dispatcher.dispatch(callback(5, 3, "{\"old\":1}")).await;

        assert!(h.api.sends().is_empty());
        assert!(h.api.edits().is_empty());
        let record = &h.analytics.records()[0];
        assert_eq!(record.errors, vec!["unknown button"]);
    }

    #[tokio::test]
    async fn donation_flow_marks_rows() {
        let h = harness();
        h.dispatcher.dispatch(text_message("private", 5, "/donate")).await;
        let data = button_data(&h.api, 0, 1);
        assert_eq!(ButtonState::decode(&data).value, "5");

        h.dispatcher.dispatch(callback(5, 11, &data)).await;
        let invoices = h.api.invoices();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount, 500);
        let payload = InvoicePayload::decode(&invoices[0].payload).unwrap();
        assert_eq!(payload.chat_id, ChatId(5));
        assert_eq!(
            h.store.donation(payload.donation_id),
            Some(DonationStatus::Initialized)
        );

        h.dispatcher
            .dispatch(update(&format!(
                r#"{{"update_id":3,"pre_checkout_query":{{"id":"pc1","currency":"EUR","total_amount":500,
                    "from":{{"id":5,"first_name":"Ann"}},
                    "invoice_payload":{}}}}}"#,
                serde_json::to_string(&invoices[0].payload).unwrap()
            )))
            .await;
        assert_eq!(h.api.pre_checkout_answers(), vec!["pc1".to_string()]);
        assert_eq!(
            h.store.donation(payload.donation_id),
            Some(DonationStatus::Pending)
        );

        h.dispatcher
            .dispatch(update(&format!(
                r#"{{"update_id":4,"message":{{"message_id":12,"chat":{{"id":5,"type":"private"}},
                    "from":{{"id":5,"first_name":"Ann"}},
                    "successful_payment":{{"currency":"EUR","total_amount":500,
                      "invoice_payload":{},"telegram_payment_charge_id":"c"}}}}}}"#,
                serde_json::to_string(&invoices[0].payload).unwrap()
            )))
            .await;
        assert_eq!(
            h.store.donation(payload.donation_id),
            Some(DonationStatus::Received)
        );
        assert_eq!(h.analytics.records().last().unwrap().command, "checkout");
    }

    #[tokio::test]
    async fn forged_donation_values_are_rejected() {
        let h = harness();
        for value in ["4", "0", "50000000", "-3", "abc"] {
            let data = ButtonState::new(ButtonKind::Donation, value, CorrelationId::from_raw("abc"))
                .encode()
                .unwrap();
            h.dispatcher.dispatch(callback(5, 11, &data)).await;
        }

        assert!(h.api.invoices().is_empty());
        let records = h.analytics.records();
        assert_eq!(records.len(), 5);
        assert!(records
            .iter()
            .all(|r| r.errors == vec!["price is not specified".to_string()]));
    }

    #[tokio::test]
    async fn donate_without_provider_says_unavailable() {
        let h = harness_with(FakeConverter::text("x"), false);
        h.dispatcher.dispatch(text_message("private", 5, "/donate")).await;
        assert_eq!(
            h.api.sent_texts(),
            vec!["Donations are not available at the moment 😔"]
        );
    }

    #[tokio::test]
    async fn subscription_in_group_points_to_dms() {
        let h = harness();
        h.dispatcher
            .dispatch(text_message("group", -20, "/subscription"))
            .await;
        assert_eq!(
            h.api.sent_texts(),
            vec!["Please manage your subscription in private messages with @VoiceBot"]
        );
    }

    #[tokio::test]
    async fn trial_then_unsubscribe() {
        let h = harness();
        h.dispatcher
            .dispatch(text_message("private", 5, "/subscription"))
            .await;
        let overview = h.api.sends()[0].clone();
        assert_eq!(overview.text, "You do not have a subscription yet. Try it for free!");
        let msg_id = overview.reference.message_id.0;

        let trial = button_data(&h.api, 0, 0);
        h.dispatcher.dispatch(callback(5, msg_id, &trial)).await;
        let (_, text, keyboard) = h.api.edits().last().unwrap().clone();
        assert!(text.starts_with("Start a free trial?"));
        let confirm = match &keyboard.unwrap().rows[0][1].kind {
            UiButton::Callback(d) => d.clone(),
            UiButton::Url(_) => unreachable!(),
        };

        h.dispatcher.dispatch(callback(5, msg_id, &confirm)).await;
        let sub = h.store.get_subscription(UserId(5)).await.unwrap().unwrap();
        assert!(sub.is_trial && sub.is_active(Utc::now()));
        assert!(h.api.edits().last().unwrap().1.starts_with("The trial is active until"));

        let unsubscribe = ButtonState::new(
            ButtonKind::Subscription,
            "-",
            CorrelationId::from_raw("abc"),
        )
        .encode()
        .unwrap();
        h.dispatcher.dispatch(callback(5, msg_id, &unsubscribe)).await;
        assert!(h
            .store
            .get_subscription(UserId(5))
            .await
            .unwrap()
            .unwrap()
            .canceled);
        assert_eq!(h.api.edits().last().unwrap().1, "The subscription is canceled");
        assert_eq!(
            h.api.edits().last().unwrap().0,
            MessageRef {
                chat_id: ChatId(5),
                message_id: MessageId(msg_id)
            }
        );
    }

    #[tokio::test]
    async fn active_subscription_is_served_from_cache() {
        let h = harness();
        h.store
            .create_subscription(Subscription {
                user_id: UserId(5),
                chat_id: ChatId(5),
                ends_at: Utc::now() + chrono::Duration::days(3),
                is_trial: false,
                canceled: false,
            })
            .await
            .unwrap();

        h.dispatcher
            .dispatch(text_message("private", 5, "/subscription"))
            .await;
        assert!(h.api.sent_texts()[0].starts_with("Your subscription is active until"));
        assert!(h.dispatcher.subscription.cache().get(&UserId(5)).is_some());
    }
}
