use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, DonationId, UserId},
    errors::Error,
    language::LanguageCode,
    ports::{DonationStatus, StatStore, Subscription},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageRow {
    pub name: String,
    pub count: u64,
    pub duration_secs: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DonationRow {
    pub chat_id: ChatId,
    pub price: u32,
    pub status: DonationStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRow {
    pub is_active: bool,
    pub version: String,
}

#[derive(Default)]
struct State {
    languages: HashMap<ChatId, LanguageCode>,
    usage: HashMap<ChatId, UsageRow>,
    ignored: HashSet<ChatId>,
    donations: HashMap<DonationId, DonationRow>,
    next_donation_id: i64,
    subscriptions: HashMap<UserId, Subscription>,
    trials: HashSet<UserId>,
    nodes: HashMap<String, NodeRow>,
}

/// Process-local `StatStore`. Used when no database is configured and by tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }

    pub fn set_ignored(&self, chat_id: ChatId, ignored: bool) {
        if let Ok(mut state) = self.lock() {
            if ignored {
                state.ignored.insert(chat_id);
            } else {
                state.ignored.remove(&chat_id);
            }
        }
    }

    pub fn usage(&self, chat_id: ChatId) -> Option<UsageRow> {
        self.lock().ok()?.usage.get(&chat_id).cloned()
    }

    pub fn donation(&self, id: DonationId) -> Option<DonationRow> {
        self.lock().ok()?.donations.get(&id).cloned()
    }

    pub fn node(&self, url: &str) -> Option<NodeRow> {
        self.lock().ok()?.nodes.get(url).cloned()
    }
}

#[async_trait]
impl StatStore for MemoryStore {
    async fn get_language(&self, chat_id: ChatId) -> Result<Option<LanguageCode>> {
        Ok(self.lock()?.languages.get(&chat_id).copied())
    }

    async fn update_language(&self, chat_id: ChatId, lang: LanguageCode) -> Result<()> {
        self.lock()?.languages.insert(chat_id, lang);
        Ok(())
    }

    async fn increment_usage(&self, chat_id: ChatId, name: &str, duration_secs: i64) -> Result<()> {
        let mut state = self.lock()?;
        let row = state.usage.entry(chat_id).or_insert_with(|| UsageRow {
            name: name.to_string(),
            count: 0,
            duration_secs: 0,
        });
        row.name = name.to_string();
        row.count += 1;
        row.duration_secs += duration_secs.max(0);
        Ok(())
    }

    async fn is_chat_ignored(&self, chat_id: ChatId) -> Result<bool> {
        Ok(self.lock()?.ignored.contains(&chat_id))
    }

    async fn create_donation(&self, chat_id: ChatId, price: u32) -> Result<DonationId> {
        let mut state = self.lock()?;
        state.next_donation_id += 1;
        let id = DonationId(state.next_donation_id);
        state.donations.insert(
            id,
            DonationRow {
                chat_id,
                price,
                status: DonationStatus::Initialized,
            },
        );
        Ok(id)
    }

    async fn update_donation(&self, id: DonationId, status: DonationStatus) -> Result<()> {
        let mut state = self.lock()?;
        let row = state
            .donations
            .get_mut(&id)
            .ok_or_else(|| Error::Store(format!("donation {id} not found")))?;
        row.status = status;
        Ok(())
    }

    async fn get_subscription(&self, user_id: UserId) -> Result<Option<Subscription>> {
        Ok(self.lock()?.subscriptions.get(&user_id).cloned())
    }

    async fn has_had_trial(&self, user_id: UserId) -> Result<bool> {
        Ok(self.lock()?.trials.contains(&user_id))
    }

    async fn create_subscription(&self, sub: Subscription) -> Result<()> {
        let mut state = self.lock()?;
        if sub.is_trial {
            state.trials.insert(sub.user_id);
        }
        state.subscriptions.insert(sub.user_id, sub);
        Ok(())
    }

    async fn cancel_subscription(&self, user_id: UserId) -> Result<()> {
        let mut state = self.lock()?;
        let sub = state
            .subscriptions
            .get_mut(&user_id)
            .ok_or_else(|| Error::Store(format!("no subscription for user {}", user_id.0)))?;
        sub.canceled = true;
        Ok(())
    }

    async fn update_node_state(&self, self_url: &str, is_active: bool, version: &str) -> Result<()> {
        self.lock()?.nodes.insert(
            self_url.to_string(),
            NodeRow {
                is_active,
                version: version.to_string(),
            },
        );
        Ok(())
    }
}
