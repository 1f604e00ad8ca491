//! Built-in English/Russian strings with `{name}` placeholders.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::language::LanguageCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    WelcomeMessage,
    WelcomeMessageGroup,
    WelcomeMessageMore,
    DonateHint,

    ChangeLangTitle,
    ChangeLang,
    UpdateLanguageError,
    BtnEnglish,
    BtnRussian,

    SupportCommand,
    GithubIssues,
    ContactAuthor,

    InProgress,
    RecognitionFailed,
    RecognitionEmpty,
    NoContent,
    GenericError,
    LongVoiceMessage,
    AudioNotSupported,
    SupportedFormats,
    Minutes,
    Seconds,

    DonateCommandMessage,
    DonationTitle,
    DonationDescription,
    DonationLabel,
    PaymentsUnavailable,

    ManageSubscriptionInDms,
    SubscriptionActive,
    SubscriptionCanceled,
    SubscriptionNone,
    SubscriptionTrialUsed,
    ConfirmUnsubscribe,
    Unsubscribed,
    ConfirmTrial,
    TrialActivated,
    BtnUnsubscribe,
    BtnConfirmUnsubscribe,
    BtnTrial,
    BtnTrialConfirm,
    BtnBack,
}

fn en(label: Label) -> &'static str {
    use Label::*;
    match label {
        WelcomeMessage => "👋🏽 Hey there! Send me a voice message and I will show what they are talking about in plain text",
        WelcomeMessageGroup => "You can add me to a group so I will convert voice messages from all the participants!\n\nEven better, I can recognise video notes (Telegram video circles) as well 🎉",
        WelcomeMessageMore => "Do not forget to select the language you want to recognise by typing the /lang command",
        DonateHint => "Support this project. Run /donate command for details",

        ChangeLangTitle => "Select the language 🔮",
        ChangeLang => "Language has been changed 🆗",
        UpdateLanguageError => "Failed to update the language. Please try again later 😔",
        BtnEnglish => "🇺🇸 English",
        BtnRussian => "🇷🇺 Russian",

        SupportCommand => "If you have any questions, you can contact the author using one of the following options",
        GithubIssues => "Report an issue",
        ContactAuthor => "Chat with the author",

        InProgress => "🎙 Processing voice message",
        RecognitionFailed => "Unable to convert voice 😔",
        RecognitionEmpty => "I could not find any text in the message 🤔",
        NoContent => "No voice track found in the message 🌚",
        GenericError => "Something went wrong 😔 Please try again later",
        LongVoiceMessage => "I do not support messages longer than {duration} at the moment 🌚",
        AudioNotSupported => "The audio file format is not supported at the moment 🌚",
        SupportedFormats => "I work with these formats: {formats}",
        Minutes => "min",
        Seconds => "sec",

        DonateCommandMessage => "This bot is a non-commercial project. Nevertheless, it requires resources to keep converting voice into text.\n\nAll donations are non-refundable. Thank you for supporting the project!",
        DonationTitle => "Support the voice bot",
        DonationDescription => "A small one-time donation to keep the bot available 24/7",
        DonationLabel => "One-time donation",
        PaymentsUnavailable => "Donations are not available at the moment 😔",

        ManageSubscriptionInDms => "Please manage your subscription in private messages with {name}",
        SubscriptionActive => "Your subscription is active until {date}",
        SubscriptionCanceled => "Your subscription is canceled and stays active until {date}",
        SubscriptionNone => "You do not have a subscription yet. Try it for free!",
        SubscriptionTrialUsed => "You do not have an active subscription. The free trial has already been used",
        ConfirmUnsubscribe => "Are you sure? The subscription stays active until {date}",
        Unsubscribed => "The subscription is canceled",
        ConfirmTrial => "Start a free trial? It lasts until {date}",
        TrialActivated => "The trial is active until {date} 🎉",
        BtnUnsubscribe => "Unsubscribe",
        BtnConfirmUnsubscribe => "Yes, unsubscribe",
        BtnTrial => "Start free trial",
        BtnTrialConfirm => "Confirm",
        BtnBack => "Back",
    }
}

fn ru(label: Label) -> &'static str {
    use Label::*;
    match label {
        WelcomeMessage => "👋🏽 Привет! отправь мне голосовое сообщение и я распознаю его в текст",
        WelcomeMessageGroup => "Ты можешь добавить меня в группу, и я буду распознавать сообщения от каждого участника!\n\nИ еще кое-что... Я умею распознавать видео сообщения (круглые видео) 🎉",
        WelcomeMessageMore => "Не забудь выбрать язык голосовых сообщений с помощью команды /lang",
        DonateHint => "Вы можете помочь и поддержать проект. Выполните /donate для подробностей",

        ChangeLangTitle => "Какой язык использовать? 🔮",
        ChangeLang => "Язык изменен 🆗",
        UpdateLanguageError => "Не удалось обновить язык. Пожалуйста, попробуйте позже 😔",
        BtnEnglish => "🇺🇸 Английский",
        BtnRussian => "🇷🇺 Русский",

        SupportCommand => "Если у вас возникли вопросы и предложения, вы можете связаться с автором одним из следующих способов",
        GithubIssues => "Написать об ошибке",
        ContactAuthor => "Написать автору",

        InProgress => "🎙 Распознаю голос",
        RecognitionFailed => "Не получилось распознать голос 😔",
        RecognitionEmpty => "Я не смог найти текст в сообщении 🤔",
        NoContent => "Голосовое сообщение не найдено 🌚",
        GenericError => "Что-то пошло не так 😔 Попробуйте позже",
        LongVoiceMessage => "Сообщения длиной больше {duration} не поддерживаются 🌚",
        AudioNotSupported => "Формат аудио файла не поддерживается 🌚",
        SupportedFormats => "Форматы, с которыми я работаю: {formats}",
        Minutes => "мин",
        Seconds => "сек",

        DonateCommandMessage => "Этот проект не является коммерческим. Тем не менее, он тратит ресурсы на то, чтобы превращать голос в текст.\n\nПожертвования не подлежат возврату. Спасибо, что помогаете проекту жить!",
        DonationTitle => "Поддержите бота",
        DonationDescription => "Небольшое единоразовое пожертвование, чтобы бот работал 24/7",
        DonationLabel => "Единоразовое пожертвование",
        PaymentsUnavailable => "Пожертвования сейчас недоступны 😔",

        ManageSubscriptionInDms => "Пожалуйста, управляйте подпиской в личных сообщениях с {name}",
        SubscriptionActive => "Ваша подписка активна до {date}",
        SubscriptionCanceled => "Подписка отменена и действует до {date}",
        SubscriptionNone => "У вас пока нет подписки. Попробуйте бесплатно!",
        SubscriptionTrialUsed => "У вас нет активной подписки. Пробный период уже использован",
        ConfirmUnsubscribe => "Вы уверены? Подписка будет действовать до {date}",
        Unsubscribed => "Подписка отменена",
        ConfirmTrial => "Начать пробный период? Он продлится до {date}",
        TrialActivated => "Пробный период активен до {date} 🎉",
        BtnUnsubscribe => "Отписаться",
        BtnConfirmUnsubscribe => "Да, отписаться",
        BtnTrial => "Попробовать бесплатно",
        BtnTrialConfirm => "Подтвердить",
        BtnBack => "Назад",
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid regex"))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Translator;

impl Translator {
    pub fn t(&self, label: Label, lang: LanguageCode) -> String {
        self.t_with(label, lang, &[])
    }

    /// Unknown placeholders are left untouched.
    pub fn t_with(&self, label: Label, lang: LanguageCode, params: &[(&str, &str)]) -> String {
        let template = match lang {
            LanguageCode::En => en(label),
            LanguageCode::Ru => ru(label),
        };
        if params.is_empty() {
            return template.to_string();
        }
        placeholder_re()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                params
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// `90` -> `1 min 30 sec`, `60` -> `1 min`, `45` -> `45 sec`.
    pub fn duration(&self, secs: u32, lang: LanguageCode) -> String {
        let min = self.t(Label::Minutes, lang);
        let sec = self.t(Label::Seconds, lang);
        if secs < 60 {
            return format!("{secs} {sec}");
        }
        let (m, s) = (secs / 60, secs % 60);
        if s == 0 {
            format!("{m} {min}")
        } else {
            format!("{m} {min} {s} {sec}")
        }
    }

    pub fn date(&self, at: DateTime<Utc>, lang: LanguageCode) -> String {
        match lang {
            LanguageCode::En => at.format("%b %-d, %Y").to_string(),
            LanguageCode::Ru => at.format("%d.%m.%Y").to_string(),
        }
    }
}
