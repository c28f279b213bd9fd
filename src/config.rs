use crate::application::orchestrator::{DEFAULT_EVENT_TOPIC, OrchestratorConfig};
use crate::application::retry::RetryPolicy;
use crate::infrastructure::cache::{DEFAULT_MAX_SIZE, DEFAULT_SWEEP_INTERVAL};
use crate::infrastructure::simulated::DEFAULT_DECLINE_SUFFIX;
use clap::{ArgAction, Args};
use std::time::Duration;

/// Service settings. Every flag falls back to an environment variable, and `.env` is
/// loaded before parsing.
#[derive(Debug, Clone, Args)]
pub struct ServiceConfig {
    /// Base URL of the banking API. Without it an in-process simulated bank is used.
    #[arg(long, env = "BANKING_API_URL")]
    pub banking_api_url: Option<String>,

    /// Per-call banking API timeout, in seconds.
    #[arg(long, env = "BANKING_API_TIMEOUT", default_value_t = 30)]
    pub banking_api_timeout: u64,

    /// Attempts for the authorize call, including the first one.
    #[arg(long, env = "AUTHORIZE_MAX_ATTEMPTS", default_value_t = 3)]
    pub authorize_max_attempts: u32,

    /// Backoff before the first authorize retry, in milliseconds.
    #[arg(long, env = "AUTHORIZE_BACKOFF_MS", default_value_t = 4_000)]
    pub authorize_backoff_ms: u64,

    /// Upper bound for the authorize backoff, in milliseconds.
    #[arg(long, env = "AUTHORIZE_MAX_BACKOFF_MS", default_value_t = 10_000)]
    pub authorize_max_backoff_ms: u64,

    /// Passphrase the card encryption key is derived from.
    #[arg(
        long,
        env = "ENCRYPTION_KEY",
        default_value = "development-encryption-key",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub encryption_key: String,

    /// Status cache TTL, in seconds.
    #[arg(long, env = "CACHE_TTL", default_value_t = 300)]
    pub cache_ttl: u64,

    #[arg(long, env = "CACHE_MAX_SIZE", default_value_t = DEFAULT_MAX_SIZE)]
    pub cache_max_size: usize,

    /// Interval of the cache expiry sweep, in seconds.
    #[arg(long, env = "CACHE_SWEEP_INTERVAL", default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
    pub cache_sweep_interval: u64,

    #[arg(long, env = "EVENT_LOGGING_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub event_logging_enabled: bool,

    #[arg(long, env = "PAYMENT_EVENT_TOPIC", default_value = DEFAULT_EVENT_TOPIC)]
    pub event_topic: String,

    /// Card number suffix the simulated bank declines.
    #[arg(long, env = "SIMULATED_DECLINE_SUFFIX", default_value = DEFAULT_DECLINE_SUFFIX)]
    pub simulated_decline_suffix: String,
}

impl ServiceConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.banking_api_timeout)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval.max(1))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            gateway_timeout: self.gateway_timeout(),
            authorize_retry: RetryPolicy {
                max_attempts: self.authorize_max_attempts.max(1),
                initial_backoff: Duration::from_millis(self.authorize_backoff_ms),
                max_backoff: Duration::from_millis(self.authorize_max_backoff_ms),
                ..RetryPolicy::default()
            },
            status_cache_ttl: Duration::from_secs(self.cache_ttl),
            event_topic: self.event_topic.clone(),
            ..OrchestratorConfig::default()
        }
    }
}
