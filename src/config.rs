//! # Broker configuration.
//!
//! Provides [`BrokerConfig`] centralized settings shared by both broker variants.
//!
//! Config is used in two ways:
//! 1. **Explicit construction**: `SyncBroker::new(config)`, `CoopBroker::start(config)`
//! 2. **Process-wide accessors**: [`crate::core::global`] reads it once via [`BrokerConfig::from_env`]
//!
//! ## Environment overrides
//! - `CHATBUS_VERBOSE` → `verbose` (`1`, `true`, `yes`, `on`; case-insensitive)
//! - `CHATBUS_TICK_MS` → `tick` in milliseconds (ignored when unparsable)

use std::time::Duration;

/// Environment variable toggling verbose broker diagnostics.
pub const ENV_VERBOSE: &str = "CHATBUS_VERBOSE";
/// Environment variable overriding the thread-domain polling tick (milliseconds).
pub const ENV_TICK_MS: &str = "CHATBUS_TICK_MS";

/// Default mailbox capacity for newly subscribed listeners.
pub const DEFAULT_CAPACITY: usize = 10;

/// Settings for a broker instance.
///
/// ## Field semantics
/// - `default_capacity`: Mailbox size used by `subscribe`/`subscribe_fn` (min 1)
/// - `tick`: Sleep between drains of a thread-domain listener (clamped to ≥ 1ms)
/// - `verbose`: Log subscriptions, emissions and overflow drops at `debug`
/// - `loop_thread_name`: OS thread name of the cooperative loop
///
/// ## Notes
/// The tick only affects the thread domain. Cooperative listeners wake as soon as
/// a message lands in their mailbox.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Mailbox capacity used when the caller does not pass one.
    pub default_capacity: usize,

    /// Polling interval of thread-domain listeners.
    ///
    /// Lower values cut latency and raise idle CPU use; each thread wakes once per tick.
    pub tick: Duration,

    /// Emit `debug` diagnostics for subscriptions, emissions and drops.
    pub verbose: bool,

    /// Name of the background thread hosting the cooperative loop.
    pub loop_thread_name: String,
}

impl BrokerConfig {
    /// Returns the default config overlaid with [`ENV_VERBOSE`] and [`ENV_TICK_MS`].
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var(ENV_VERBOSE) {
            cfg.verbose = parse_flag(&raw);
        }
        if let Some(ms) = std::env::var(ENV_TICK_MS)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            cfg.tick = Duration::from_millis(ms);
        }
        cfg
    }

    /// Returns the polling tick clamped to a minimum of 1ms.
    ///
    /// A zero tick would turn every idle listener into a busy loop.
    #[inline]
    pub fn tick_clamped(&self) -> Duration {
        self.tick.max(Duration::from_millis(1))
    }

    /// Builder-style setter for [`BrokerConfig::tick`].
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Builder-style setter for [`BrokerConfig::default_capacity`].
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Builder-style setter for [`BrokerConfig::verbose`].
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Default for BrokerConfig {
    /// Default configuration:
    ///
    /// - `default_capacity = 10`
    /// - `tick = 1/60s` (one drain per display frame)
    /// - `verbose = false`
    /// - `loop_thread_name = "chatbus-coop"`
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            tick: Duration::from_secs(1) / 60,
            verbose: false,
            loop_thread_name: "chatbus-coop".to_string(),
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
