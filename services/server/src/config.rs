//! Runtime configuration (§6.4). Every knob is read from the environment
//! with the teacher's `main.rs` idiom (`env::var(...).unwrap_or_else(|_|
//! default)`) rather than a config file, since the framework has no file
//! format of its own to parse — route scanning, CLI, and plugin config are
//! external collaborators per spec §1.

use std::env;
use std::time::Duration;

/// Which render strategy a route uses absent a per-route override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Ssr,
    Ssg,
    Isr,
    Ppr,
}

impl RenderMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "ssr" => Some(Self::Ssr),
            "ssg" => Some(Self::Ssg),
            "isr" => Some(Self::Isr),
            "ppr" => Some(Self::Ppr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubSubBackend {
    Memory,
    Redis,
}

/// §6.4's configuration surface. `render_cache_max_entries` of `-1` means
/// unbounded, matching the spec's own encoding of "no limit".
#[derive(Debug, Clone)]
pub struct Config {
    pub default_render_mode: RenderMode,
    /// ISR requires template caching to be enabled; with it disabled every
    /// strategy degrades to SSR (§4.10).
    pub template_caching_enabled: bool,
    pub isr_default_ttl: Duration,
    pub render_cache_max_entries: i64,
    pub diffing_enabled: bool,
    pub compression_enabled: bool,
    pub session_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_initial_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub storage_backend: StorageBackend,
    pub pubsub_backend: PubSubBackend,
    pub bind_addr: String,
    pub send_queue_capacity: usize,
    pub max_frame_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_render_mode: RenderMode::Ssr,
            template_caching_enabled: true,
            isr_default_ttl: Duration::from_secs(60),
            render_cache_max_entries: 500,
            diffing_enabled: false,
            compression_enabled: false,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_initial_delay: Duration::from_millis(250),
            max_reconnect_attempts: 5,
            storage_backend: StorageBackend::Memory,
            pubsub_backend: PubSubBackend::Memory,
            bind_addr: "0.0.0.0:8080".to_owned(),
            send_queue_capacity: 256,
            max_frame_bytes: rs_protocol::MAX_FRAME_BYTES,
        }
    }
}

impl Config {
    /// Builds configuration from the environment, falling back to
    /// [`Config::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            default_render_mode: env::var("RENDER_MODE")
                .ok()
                .and_then(|v| RenderMode::parse(&v))
                .unwrap_or(default.default_render_mode),
            template_caching_enabled: env_bool("TEMPLATE_CACHING", default.template_caching_enabled),
            isr_default_ttl: env_secs("ISR_TTL_SECONDS", default.isr_default_ttl),
            render_cache_max_entries: env::var("RENDER_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.render_cache_max_entries),
            diffing_enabled: env_bool("DIFFING_ENABLED", default.diffing_enabled),
            compression_enabled: env_bool("COMPRESSION_ENABLED", default.compression_enabled),
            session_ttl: env_secs("SESSION_TTL_SECONDS", default.session_ttl),
            heartbeat_interval: env_secs("HEARTBEAT_INTERVAL_SECONDS", default.heartbeat_interval),
            reconnect_initial_delay: env_millis(
                "RECONNECT_INITIAL_DELAY_MS",
                default.reconnect_initial_delay,
            ),
            max_reconnect_attempts: env::var("MAX_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_reconnect_attempts),
            storage_backend: match env::var("STORAGE_BACKEND").ok().as_deref() {
                Some("redis") => StorageBackend::Redis,
                _ => default.storage_backend,
            },
            pubsub_backend: match env::var("PUBSUB_BACKEND").ok().as_deref() {
                Some("redis") => PubSubBackend::Redis,
                _ => default.pubsub_backend,
            },
            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),
            send_queue_capacity: env::var("SEND_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.send_queue_capacity),
            max_frame_bytes: default.max_frame_bytes,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
