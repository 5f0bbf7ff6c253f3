use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Roster-Sync
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub reset: ResetConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Groups crawled on every sync cycle in addition to room defaults
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    /// Dungeon abbreviation -> full dungeon name, used to parse key specs like `fh+18`
    #[serde(default)]
    pub dungeons: BTreeMap<String, String>,
}

/// Sync loop behavior
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Seconds between two sync cycles
    #[serde(rename = "interval-secs", default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Days without a successful sync after which an unresolvable entity is deleted
    #[serde(rename = "staleness-days", default = "default_staleness_days")]
    pub staleness_days: i64,

    /// Lowest character level kept from a roster fetch
    #[serde(rename = "min-level", default = "default_level")]
    pub min_level: u32,

    /// Highest character level kept from a roster fetch
    #[serde(rename = "max-level", default = "default_level")]
    pub max_level: u32,
}

/// Outbound call budget against the upstream APIs
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Calls permitted within one window
    #[serde(rename = "max-calls", default = "default_max_calls")]
    pub max_calls: u32,

    /// Window length in seconds
    #[serde(rename = "period-secs", default = "default_period_secs")]
    pub period_secs: u64,

    /// Calls allowed to be in flight at the same time
    #[serde(rename = "max-in-flight", default = "default_max_in_flight")]
    pub max_in_flight: u32,
}

/// Weekly reset window
#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    /// Day of week of the reset, e.g. "tue" (UTC)
    #[serde(default = "default_reset_weekday")]
    pub weekday: String,

    /// Hour of day of the reset (UTC, 0-23)
    #[serde(default = "default_reset_hour")]
    pub hour: u32,

    /// Seconds between two reset-window checks
    #[serde(rename = "poll-secs", default = "default_poll_secs")]
    pub poll_secs: u64,
}

/// Client-credentials grant against the upstream identity provider
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "client-id")]
    pub client_id: String,

    #[serde(rename = "client-secret")]
    pub client_secret: String,

    /// Credential endpoint (POST)
    #[serde(rename = "token-url")]
    pub token_url: String,

    /// Token introspection endpoint (GET, 200 = valid)
    #[serde(rename = "validate-url")]
    pub validate_url: String,

    /// Seconds to wait between two failed refresh attempts
    #[serde(rename = "retry-backoff-secs", default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Refresh attempts before giving up; 0 retries forever
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds a successful validation is trusted; 0 validates on every call
    #[serde(rename = "validate-ttl-secs", default)]
    pub validate_ttl_secs: u64,
}

/// Upstream data endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the character profile API
    #[serde(rename = "profile-url")]
    pub profile_url: String,

    /// Base URL of the roster API; `{region}` is substituted per request
    #[serde(rename = "roster-url")]
    pub roster_url: String,

    #[serde(default = "default_locale")]
    pub locale: String,

    /// Per-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "bot-name")]
    pub bot_name: String,

    #[serde(rename = "bot-version")]
    pub bot_version: String,

    /// URL with information about the bot
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Notification delivery
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Webhook receiving messages for the general audience
    #[serde(rename = "general-webhook")]
    pub general_webhook: Option<String>,

    /// Webhook receiving operator alerts
    #[serde(rename = "operator-webhook")]
    pub operator_webhook: Option<String>,
}

/// A group crawled on every cycle
#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    pub realm: String,
    pub region: String,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_staleness_days() -> i64 {
    30
}

fn default_level() -> u32 {
    80
}

fn default_max_calls() -> u32 {
    120
}

fn default_period_secs() -> u64 {
    60
}

fn default_max_in_flight() -> u32 {
    4
}

fn default_reset_weekday() -> String {
    "tue".to_string()
}

fn default_reset_hour() -> u32 {
    15
}

fn default_poll_secs() -> u64 {
    300
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    10
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            staleness_days: default_staleness_days(),
            min_level: default_level(),
            max_level: default_level(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            period_secs: default_period_secs(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            weekday: default_reset_weekday(),
            hour: default_reset_hour(),
            poll_secs: default_poll_secs(),
        }
    }
}
