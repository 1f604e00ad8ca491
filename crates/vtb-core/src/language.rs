//! Recognition language and its resolution: explicit, stored, then inferred.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{domain::ChatId, ports::StatStore, prefix::MessagePrefix};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageCode {
    #[serde(rename = "en-US")]
    En,
    #[serde(rename = "ru-RU")]
    Ru,
}

impl LanguageCode {
    pub const ALL: [LanguageCode; 2] = [LanguageCode::En, LanguageCode::Ru];

    pub fn as_str(self) -> &'static str {
        match self {
            LanguageCode::En => "en-US",
            LanguageCode::Ru => "ru-RU",
        }
    }

    /// ISO 639-1 part, as recognition providers expect it.
    pub fn short(self) -> &'static str {
        match self {
            LanguageCode::En => "en",
            LanguageCode::Ru => "ru",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    /// Guess from a Telegram `language_code` hint (`ru`, `ru-RU`, `en`, ...).
    pub fn infer(locale: Option<&str>) -> Self {
        let Some(locale) = locale else {
            return LanguageCode::En;
        };
        let primary = locale.split(['-', '_']).next().unwrap_or_default();
        if primary.eq_ignore_ascii_case("ru") {
            LanguageCode::Ru
        } else {
            LanguageCode::En
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct LanguageResolver {
    store: Arc<dyn StatStore>,
}

impl LanguageResolver {
    pub fn new(store: Arc<dyn StatStore>) -> Self {
        Self { store }
    }

    /// Never fails: store errors fall back to the locale guess.
    pub async fn resolve(
        &self,
        chat_id: ChatId,
        explicit: Option<LanguageCode>,
        locale: Option<&str>,
        prefix: &MessagePrefix,
    ) -> LanguageCode {
        if let Some(lang) = explicit {
            return lang;
        }

        let inferred = LanguageCode::infer(locale);
        match self.store.get_language(chat_id).await {
            Ok(Some(lang)) => lang,
            Ok(None) => {
                info!(%prefix, lang = %inferred, "no stored language, saving inferred one");
                if let Err(err) = self.store.update_language(chat_id, inferred).await {
                    warn!(%prefix, "unable to save inferred language: {err}");
                }
                inferred
            }
            Err(err) => {
                warn!(%prefix, "unable to read chat language, using {inferred}: {err}");
                inferred
            }
        }
    }

    pub async fn update(&self, chat_id: ChatId, lang: LanguageCode) -> crate::Result<()> {
        self.store.update_language(chat_id, lang).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;

    fn prefix() -> MessagePrefix {
        MessagePrefix::new(ChatId(1))
    }

    #[test]
    fn infers_from_locale() {
        assert_eq!(LanguageCode::infer(Some("ru")), LanguageCode::Ru);
        assert_eq!(LanguageCode::infer(Some("ru-UA")), LanguageCode::Ru);
        assert_eq!(LanguageCode::infer(Some("de")), LanguageCode::En);
        assert_eq!(LanguageCode::infer(None), LanguageCode::En);
    }

    #[test]
    fn parses_full_codes_only() {
        assert_eq!(LanguageCode::parse("ru-RU"), Some(LanguageCode::Ru));
        assert_eq!(LanguageCode::parse("en-us"), Some(LanguageCode::En));
        assert_eq!(LanguageCode::parse("fr-FR"), None);
    }

    #[tokio::test]
    async fn explicit_wins_without_touching_store() {
        let store = Arc::new(FakeStore::default());
        store.fail_language_reads(true);
        let resolver = LanguageResolver::new(store.clone());

        let lang = resolver
            .resolve(ChatId(1), Some(LanguageCode::Ru), Some("en"), &prefix())
            .await;
        assert_eq!(lang, LanguageCode::Ru);
    }

    #[tokio::test]
    async fn stored_language_beats_locale() {
        let store = Arc::new(FakeStore::default());
        store
            .update_language(ChatId(1), LanguageCode::Ru)
            .await
            .unwrap();
        let resolver = LanguageResolver::new(store);

        let lang = resolver.resolve(ChatId(1), None, Some("en"), &prefix()).await;
        assert_eq!(lang, LanguageCode::Ru);
    }

    #[tokio::test]
    async fn missing_row_is_created_with_inferred_language() {
        let store = Arc::new(FakeStore::default());
        let resolver = LanguageResolver::new(store.clone());

        let lang = resolver.resolve(ChatId(2), None, Some("ru"), &prefix()).await;
        assert_eq!(lang, LanguageCode::Ru);
        assert_eq!(
            store.get_language(ChatId(2)).await.unwrap(),
            Some(LanguageCode::Ru)
        );
    }

    #[tokio::test]
    async fn store_failure_falls_back_to_inferred() {
        let store = Arc::new(FakeStore::default());
        store.fail_language_reads(true);
        let resolver = LanguageResolver::new(store);

        let lang = resolver.resolve(ChatId(3), None, Some("ru"), &prefix()).await;
        assert_eq!(lang, LanguageCode::Ru);
    }
}
