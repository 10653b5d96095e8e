//! Configuration types for optrack

use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Instrument catalog configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Bybit instruments-info endpoint
    #[serde(default = "default_catalog_url")]
    pub base_url: String,

    /// Base assets to resolve option symbols for
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,

    /// Fetch attempts before giving up on a refresh
    #[serde(default = "default_catalog_retries")]
    pub retry_attempts: u32,

    /// Base delay between fetch attempts, scaled linearly per attempt
    #[serde(default = "default_catalog_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Daily refresh time of day, UTC, "HH:MM". Aligned to the exchange's
    /// instrument-listing cycle rather than a fixed interval.
    #[serde(default = "default_refresh_at")]
    pub refresh_at: String,
}

fn default_catalog_url() -> String {
    "https://api.bybit.com/v5/market/instruments-info".to_string()
}
fn default_assets() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()]
}
fn default_catalog_timeout_secs() -> u64 {
    10
}
fn default_catalog_retries() -> u32 {
    3
}
fn default_catalog_retry_delay_ms() -> u64 {
    1000
}
fn default_refresh_at() -> String {
    "08:05".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_url(),
            assets: default_assets(),
            timeout_secs: default_catalog_timeout_secs(),
            retry_attempts: default_catalog_retries(),
            retry_delay_ms: default_catalog_retry_delay_ms(),
            refresh_at: default_refresh_at(),
        }
    }
}

/// Subscription chunking and pacing configuration.
///
/// Larger chunks mean fewer control messages but a single rejection
/// invalidates more symbols at once; the default stays small.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// Maximum symbols per subscribe request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum delay between successive chunk subscribes
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,

    /// Retries per rejected chunk before deferring it to the next full
    /// re-subscription pass
    #[serde(default = "default_chunk_retries")]
    pub retry_attempts: u32,
}

fn default_chunk_size() -> usize {
    10
}
fn default_chunk_delay_ms() -> u64 {
    500
}
fn default_chunk_retries() -> u32 {
    3
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            retry_attempts: default_chunk_retries(),
        }
    }
}

/// WebSocket transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Bybit public options stream URL
    #[serde(default = "default_ws_url")]
    pub url: String,

    /// Handshake timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Interval between heartbeat pings, seconds
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Timeout for the pong response, seconds
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Treat the connection as dead after this long without any inbound
    /// frame, seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Initial reconnect backoff delay, milliseconds
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Maximum reconnect backoff delay, milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Consecutive failed attempts before escalating to an alerting log.
    /// Reconnection itself never stops.
    #[serde(default = "default_escalate_after")]
    pub escalate_after_attempts: u32,
}

fn default_ws_url() -> String {
    "wss://stream.bybit.com/v5/public/option".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_pong_timeout_secs() -> u64 {
    10
}
fn default_idle_timeout_secs() -> u64 {
    60
}
fn default_backoff_initial_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    60_000
}
fn default_escalate_after() -> u32 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            escalate_after_attempts: default_escalate_after(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Batch writer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Flush once this many records are buffered
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush after this long since the last flush, milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Capacity of the channel between the receive loop and the writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Write attempts per batch before dropping it
    #[serde(default = "default_write_retries")]
    pub retry_attempts: u32,

    /// Base delay between write attempts, scaled linearly, milliseconds
    #[serde(default = "default_write_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_batch_size() -> usize {
    200
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_queue_capacity() -> usize {
    2000
}
fn default_write_retries() -> u32 {
    3
}
fn default_write_retry_delay_ms() -> u64 {
    500
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            queue_capacity: default_queue_capacity(),
            retry_attempts: default_write_retries(),
            retry_delay_ms: default_write_retry_delay_ms(),
        }
    }
}

/// Store (Redis) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// TTL applied to every entry on every write, seconds
    #[serde(default = "default_entry_ttl_secs")]
    pub entry_ttl_secs: u64,

    /// Per-operation timeout, seconds
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_entry_ttl_secs() -> u64 {
    86_400
}
fn default_store_timeout_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            entry_ttl_secs: default_entry_ttl_secs(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval between periodic stats log lines, seconds (0 disables)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
