//! Broker core: registries and the two delivery domains.
//!
//! - [`SyncBroker`]: every listener owns an OS thread polling its mailbox;
//! - [`CoopBroker`]: every listener is a task on one event-loop thread;
//! - [`global`]: lazily created process-wide instances of both.
//!
//! Internal modules:
//! - `registry`: ordered event → listener table and the shared fan-out step.

mod coop_broker;
pub mod global;
pub(crate) mod registry;
mod sync_broker;

pub use coop_broker::CoopBroker;
pub use registry::BrokerStats;
pub use sync_broker::SyncBroker;
