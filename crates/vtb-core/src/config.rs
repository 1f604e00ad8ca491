use std::{
    env, fs,
    path::Path,
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_SUPPORTED_MIME_TYPES: &[&str] = &[
    "audio/ogg",
    "audio/opus",
    "audio/x-opus+ogg",
    "audio/mpeg",
    "audio/mp4",
];

pub const DEFAULT_ISSUES_URL: &str = "https://github.com/n0th1ng-else/voice-to-text-bot/issues";

/// Typed configuration, loaded from the environment (and `.env`, if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_bot_name: Option<String>,
    pub telegram_message_limit: usize,

    // Hosting
    pub self_url: String,
    pub next_replica_url: String,
    pub lifecycle_interval_days: i64,
    pub daemon_tick: Duration,
    pub app_port: u16,
    pub app_version: String,
    pub webhook_path: String,

    // Voice policy
    pub voice_duration_limit_secs: u32,
    pub supported_mime_types: Vec<String>,

    // Outbound calls
    pub api_timeout: Duration,

    // Optional providers / links
    pub author_url: Option<String>,
    pub issues_url: String,
    pub payment_provider_token: Option<String>,
    pub openai_api_key: Option<String>,

    // Subscriptions
    pub subscription_cache_size: usize,
    pub trial_duration_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            telegram_bot_name: None,
            telegram_message_limit: 4096,
            self_url: String::new(),
            next_replica_url: String::new(),
            lifecycle_interval_days: 1,
            daemon_tick: Duration::from_secs(60),
            app_port: 3000,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            webhook_path: "/bot/message".to_string(),
            voice_duration_limit_secs: 90,
            supported_mime_types: DEFAULT_SUPPORTED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            api_timeout: Duration::from_millis(10_000),
            author_url: None,
            issues_url: DEFAULT_ISSUES_URL.to_string(),
            payment_provider_token: None,
            openai_api_key: None,
            subscription_cache_size: 100,
            trial_duration_days: 7,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let defaults = Self::default();

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_bot_name = env_str("TELEGRAM_BOT_NAME").and_then(non_empty);
        let telegram_message_limit =
            env_usize("TELEGRAM_MESSAGE_LIMIT").unwrap_or(defaults.telegram_message_limit);

        // Replica handoff
        let self_url = trim_url(env_str("SELF_URL").unwrap_or_default());
        let next_replica_url = trim_url(env_str("NEXT_REPLICA_URL").unwrap_or_default());
        let lifecycle_interval_days =
            env_i64("LIFECYCLE_INTERVAL_DAYS").unwrap_or(defaults.lifecycle_interval_days);
        let daemon_tick = env_u64("DAEMON_TICK_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.daemon_tick);

        let app_port = env_str("APP_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(defaults.app_port);
        let app_version = env_str("APP_VERSION")
            .and_then(non_empty)
            .unwrap_or(defaults.app_version);
        let webhook_path = env_str("WEBHOOK_PATH")
            .and_then(non_empty)
            .unwrap_or(defaults.webhook_path);

        // Voice policy
        let voice_duration_limit_secs = u32_or(
            env_u64("VOICE_DURATION_LIMIT_SECS"),
            defaults.voice_duration_limit_secs,
        );
        let supported_mime_types = parse_csv_lower(env_str("SUPPORTED_MIME_TYPES"));
        let supported_mime_types = if supported_mime_types.is_empty() {
            defaults.supported_mime_types
        } else {
            supported_mime_types
        };

        let api_timeout = env_u64("API_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.api_timeout);

        let author_url = env_str("AUTHOR_URL").and_then(non_empty);
        let issues_url = env_str("ISSUES_URL")
            .and_then(non_empty)
            .unwrap_or(defaults.issues_url);
        let payment_provider_token = env_str("PAYMENT_PROVIDER_TOKEN").and_then(non_empty);
        let openai_api_key = env_str("OPENAI_API_KEY").and_then(non_empty);

        let subscription_cache_size =
            env_usize("SUBSCRIPTION_CACHE_SIZE").unwrap_or(defaults.subscription_cache_size);
        let trial_duration_days =
            env_i64("TRIAL_DURATION_DAYS").unwrap_or(defaults.trial_duration_days);

        Ok(Self {
            telegram_bot_token,
            telegram_bot_name,
            telegram_message_limit,
            self_url,
            next_replica_url,
            lifecycle_interval_days,
            daemon_tick,
            app_port,
            app_version,
            webhook_path,
            voice_duration_limit_secs,
            supported_mime_types,
            api_timeout,
            author_url,
            issues_url,
            payment_provider_token,
            openai_api_key,
            subscription_cache_size,
            trial_duration_days,
        })
    }

    /// Whether the uptime daemon has everything it needs.
    pub fn has_replica_handoff(&self) -> bool {
        !self.self_url.is_empty() && !self.next_replica_url.is_empty()
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

/// Out-of-range values fall back to the default instead of wrapping.
fn u32_or(value: Option<u64>, default: u32) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(default)
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn trim_url(s: String) -> String {
    s.trim().trim_end_matches('/').to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
