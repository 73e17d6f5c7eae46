//! # Listener traits.
//!
//! [`Listener`] is the thread-domain extension point, [`AsyncListener`] the
//! cooperative one. Both receive the event name and the payload; handlers report
//! failures by returning `Err`, which the worker logs and counts.
//!
//! ## Example
//! ```rust
//! use chatbus::{Listener, Payload};
//!
//! struct Counter(u32);
//!
//! impl Listener for Counter {
//!     fn handle(&mut self, _event: &str, _payload: &Payload) -> anyhow::Result<()> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str { "counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Payload;

/// Consumer driven by its own OS thread.
///
/// The thread wakes every tick, drains the mailbox through [`handle`](Self::handle),
/// calls [`idle`](Self::idle) once, and sleeps again. Blocking work is fine here;
/// it only delays this listener.
pub trait Listener: Send + 'static {
    /// Processes one message. Messages arrive in enqueue order.
    ///
    /// Returning `Err` (or panicking) is logged with the event name; the next message is
    /// still delivered.
    fn handle(&mut self, event: &str, payload: &Payload) -> anyhow::Result<()>;

    /// Extra work performed after each drain, before the thread sleeps.
    ///
    /// Keep it short: it runs once per tick.
    fn idle(&mut self) {}

    /// Name used for the thread and in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Consumer driven as a task on the shared cooperative loop.
///
/// ### Implementation requirements
/// - Never block: long synchronous work stalls every cooperative listener and every
///   pending broker mutation.
/// - Yield with `.await` on I/O, timers or channels.
#[async_trait]
pub trait AsyncListener: Send + 'static {
    /// Processes one message. Messages arrive in enqueue order.
    async fn handle(&mut self, event: &str, payload: &Payload) -> anyhow::Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
