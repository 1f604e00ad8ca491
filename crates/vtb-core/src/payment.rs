//! Donation levels and the payment provider seam.

use crate::{domain::DonationId, errors::Error, language::LanguageCode, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DonationLevel {
    /// Whole currency units.
    pub amount: u32,
    pub meta: &'static str,
}

pub const DONATION_LEVELS: [DonationLevel; 3] = [
    DonationLevel {
        amount: 3,
        meta: "🚀",
    },
    DonationLevel {
        amount: 5,
        meta: "😎",
    },
    DonationLevel {
        amount: 7,
        meta: "👑",
    },
];

pub fn to_currency(amount: u32, meta: &str) -> String {
    format!("{amount} € {meta}")
}

pub trait PaymentService: Send + Sync {
    fn is_ready(&self) -> bool;

    fn currency(&self) -> &str;

    /// Provider token for an invoice of `price` whole units.
    fn get_link(&self, price: u32, donation_id: DonationId, lang: LanguageCode) -> Result<String>;
}

/// Telegram Payments with a static provider token (Stripe, etc).
#[derive(Clone, Debug)]
pub struct ProviderTokenPayment {
    token: Option<String>,
}

impl ProviderTokenPayment {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl PaymentService for ProviderTokenPayment {
    fn is_ready(&self) -> bool {
        self.token.is_some()
    }

    fn currency(&self) -> &str {
        "EUR"
    }

    fn get_link(&self, _price: u32, _donation_id: DonationId, _lang: LanguageCode) -> Result<String> {
        self.token
            .clone()
            .ok_or_else(|| Error::Config("PAYMENT_PROVIDER_TOKEN is not set".to_string()))
    }
}
