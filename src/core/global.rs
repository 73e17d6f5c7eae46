//! Process-wide brokers.
//!
//! Components that cannot be handed a broker explicitly reach the shared instances
//! through [`sync_broker`] and [`coop_broker`]. Both are created lazily on first use
//! from [`BrokerConfig::from_env`] and live for the rest of the process.
//!
//! Passing a broker by value is preferred where possible; the globals exist for
//! leaf components (loggers, hardware wrappers) created far from the wiring code.

use std::sync::{Mutex, OnceLock, PoisonError};

use crate::config::BrokerConfig;
use crate::core::coop_broker::CoopBroker;
use crate::core::sync_broker::SyncBroker;
use crate::error::BrokerError;

static SYNC: OnceLock<SyncBroker> = OnceLock::new();
static COOP: OnceLock<CoopBroker> = OnceLock::new();
static COOP_INIT: Mutex<()> = Mutex::new(());

/// Shared thread-domain broker.
pub fn sync_broker() -> &'static SyncBroker {
    SYNC.get_or_init(|| SyncBroker::new(BrokerConfig::from_env()))
}

/// Shared cooperative broker. The loop thread starts on the first call.
///
/// # Errors
/// Propagates [`CoopBroker::start`] failures; a later call retries.
pub fn coop_broker() -> Result<&'static CoopBroker, BrokerError> {
    if let Some(broker) = COOP.get() {
        return Ok(broker);
    }

    let _guard = COOP_INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(broker) = COOP.get() {
        return Ok(broker);
    }
    let broker = CoopBroker::start(BrokerConfig::from_env())?;
    Ok(COOP.get_or_init(|| broker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_broker_is_a_singleton() {
        assert!(std::ptr::eq(sync_broker(), sync_broker()));
    }

    #[test]
    fn coop_broker_is_a_singleton() {
        let a = coop_broker().unwrap();
        let b = coop_broker().unwrap();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn concurrent_first_use_starts_one_loop() {
        let ptrs: Vec<usize> = (0..4)
            .map(|_| std::thread::spawn(|| coop_broker().unwrap() as *const CoopBroker as usize))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
    }
}
