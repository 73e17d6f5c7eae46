//! Error types used by the broker runtime.
//!
//! Only **setup-time misuse** is surfaced to callers; everything on the delivery
//! path (overflow drops, handler failures, panics) is contained at the listener
//! boundary and reported through logs and counters instead.
//!
//! - [`BrokerError`]: errors returned by `subscribe`/`attach`/`start`.
//!
//! Handler failures are plain [`anyhow::Error`]s returned by listener code; they
//! never reach the emitter.

use std::io;

use thiserror::Error;

use crate::listeners::Domain;

/// # Errors produced when wiring listeners into a broker.
///
/// These represent programmer errors or resource exhaustion at setup time.
/// Emission never fails.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// A mailbox was requested with capacity zero; it could never hold a message.
    #[error("mailbox capacity must be at least 1")]
    ZeroCapacity,

    /// A listener handle from one concurrency domain was attached to the other broker.
    #[error("listener {listener:?} belongs to the {actual} domain, broker expects {expected}")]
    DomainMismatch {
        /// Name of the offending listener.
        listener: String,
        /// Domain the broker drives.
        expected: Domain,
        /// Domain the listener was created for.
        actual: Domain,
    },

    /// The OS refused to spawn a listener or loop thread.
    #[error("failed to spawn thread {name:?}: {source}")]
    Spawn {
        /// Thread name that was requested.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The cooperative runtime could not be built.
    #[error("failed to build cooperative runtime: {0}")]
    Runtime(#[source] io::Error),

    /// The cooperative loop has exited; nothing can be scheduled on it any more.
    #[error("cooperative loop is closed")]
    LoopClosed,
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use chatbus::BrokerError;
    ///
    /// assert_eq!(BrokerError::ZeroCapacity.as_label(), "broker_zero_capacity");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::ZeroCapacity => "broker_zero_capacity",
            BrokerError::DomainMismatch { .. } => "broker_domain_mismatch",
            BrokerError::Spawn { .. } => "broker_spawn_failed",
            BrokerError::Runtime(_) => "broker_runtime_failed",
            BrokerError::LoopClosed => "broker_loop_closed",
        }
    }

    /// Indicates whether the error is a misuse of the API rather than a resource failure.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            BrokerError::ZeroCapacity | BrokerError::DomainMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = BrokerError::DomainMismatch {
            listener: "player".into(),
            expected: Domain::Thread,
            actual: Domain::Cooperative,
        };
        assert_eq!(err.as_label(), "broker_domain_mismatch");
        assert!(err.is_misuse());
        assert_eq!(
            err.to_string(),
            "listener \"player\" belongs to the cooperative domain, broker expects thread"
        );
    }

    #[test]
    fn resource_failures_are_not_misuse() {
        let err = BrokerError::Spawn {
            name: "mic".into(),
            source: io::Error::other("no threads left"),
        };
        assert!(!err.is_misuse());
        assert!(!BrokerError::LoopClosed.is_misuse());
        assert_eq!(BrokerError::Runtime(io::Error::other("x")).as_label(), "broker_runtime_failed");
    }
}
