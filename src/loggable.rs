//! # Tagged log lines over the thread-domain broker.
//!
//! A [`Logger`] publishes each line as a [`LogLine`] on the event `"log {tag}"`, so a
//! log window (or a relay into the cooperative domain) can subscribe per component.
//! In plain mode the line goes to `tracing` instead and nothing is emitted.
//!
//! ```rust
//! use chatbus::{Loggable, Logger, SyncBroker};
//!
//! struct Recognizer {
//!     logger: Logger,
//! }
//!
//! impl Loggable for Recognizer {
//!     fn logger(&self) -> &Logger {
//!         &self.logger
//!     }
//! }
//!
//! let rec = Recognizer { logger: Logger::new("recognizer", SyncBroker::default()) };
//! rec.log(format_args!("mic level {}", 3));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::core::SyncBroker;
use crate::events::Payload;
use crate::events::vocabulary::{self, LogLine};

/// Component-tagged log publisher.
#[derive(Clone)]
pub struct Logger {
    tag: Arc<str>,
    event: String,
    broker: SyncBroker,
    plain: bool,
}

impl Logger {
    /// Creates a logger publishing on `"log {tag}"`.
    pub fn new(tag: &str, broker: SyncBroker) -> Self {
        Self {
            tag: Arc::from(tag),
            event: vocabulary::log_event(tag),
            broker,
            plain: false,
        }
    }

    /// Writes through `tracing` instead of the broker.
    #[must_use]
    pub fn with_plain(mut self, plain: bool) -> Self {
        self.plain = plain;
        self
    }

    /// Component tag given at construction.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Event name this logger publishes on.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Publishes one line. Never blocks and never fails.
    pub fn log(&self, line: impl fmt::Display) {
        let line = line.to_string();
        if self.plain {
            tracing::info!(tag = &*self.tag, "{line}");
            return;
        }
        self.broker.emit(
            &self.event,
            Payload::new(LogLine {
                tag: self.tag.to_string(),
                line,
            }),
        );
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("tag", &self.tag)
            .field("plain", &self.plain)
            .finish()
    }
}

/// Capability for components that publish tagged log lines.
pub trait Loggable {
    /// Logger carrying this component's tag.
    fn logger(&self) -> &Logger;

    /// Publishes `line` through [`logger`](Self::logger).
    fn log(&self, line: impl fmt::Display)
    where
        Self: Sized,
    {
        self.logger().log(line);
    }
}
