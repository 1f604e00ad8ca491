use crate::domain::{ChatId, ThreadId};

/// Inline keyboard attached to an outgoing message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub kind: ButtonKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonKind {
    /// Opaque payload echoed back in a callback query (encoded `ButtonState`).
    Callback(String),
    Url(String),
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ButtonKind::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ButtonKind::Url(url.into()),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }
}

/// Per-send options.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub keyboard: Option<InlineKeyboard>,
    pub thread_id: Option<ThreadId>,
    /// Send as plain text instead of HTML.
    pub disable_markup: bool,
}

impl SendOptions {
    pub fn in_thread(thread_id: Option<ThreadId>) -> Self {
        Self {
            thread_id,
            ..Self::default()
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn plain(mut self) -> Self {
        self.disable_markup = true;
        self
    }
}

/// A payment invoice request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invoice {
    pub chat_id: ChatId,
    pub title: String,
    pub description: String,
    /// Opaque payload echoed back in pre-checkout and successful payment.
    pub payload: String,
    pub provider_token: String,
    pub currency: String,
    pub label: String,
    /// Amount in the smallest currency unit.
    pub amount: u32,
    pub start_parameter: String,
    pub photo_url: Option<String>,
    pub thread_id: Option<ThreadId>,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_edit: bool,
    pub max_message_len: usize,
}
