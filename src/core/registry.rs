//! # Subscription registry and fan-out.
//!
//! Maps event names to listener sets. Owned by exactly one broker and always
//! accessed under that broker's lock.
//!
//! ## Rules
//! - Event names keep first-subscription order (diagnostics only; no delivery meaning).
//! - A listener appears at most once per event; it may appear under many events.
//! - Removing the last listener of an event removes the event entry.
//! - Removal of absent pairs is a no-op.
//! - A stopped listener stays registered until the next emit that reaches it; the
//!   broker then drops it from every event.
//!
//! The number of distinct event names in a process is small (tens), so entries live
//! in a `Vec` and lookups scan it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::events::Message;
use crate::listeners::{ListenerHandle, ListenerId};
use crate::mailbox::Delivery;

struct Entry {
    event: Arc<str>,
    listeners: Vec<ListenerHandle>,
}

/// Insertion-ordered `event → {listener}` mapping.
#[derive(Default)]
pub(crate) struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    fn entry(&self, event: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| &*e.event == event)
    }

    /// Adds `handle` under `event`. Returns `false` if it was already there.
    pub(crate) fn insert(&mut self, event: &str, handle: ListenerHandle) -> bool {
        match self.entries.iter_mut().find(|e| &*e.event == event) {
            Some(entry) => {
                if entry.listeners.contains(&handle) {
                    return false;
                }
                entry.listeners.push(handle);
            }
            None => self.entries.push(Entry {
                event: Arc::from(event),
                listeners: vec![handle],
            }),
        }
        true
    }

    /// Removes `id` from `event`. Returns `true` if something was removed.
    pub(crate) fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(pos) = self.entries.iter().position(|e| &*e.event == event) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        let before = entry.listeners.len();
        entry.listeners.retain(|h| h.id() != id);
        let removed = entry.listeners.len() != before;
        if entry.listeners.is_empty() {
            self.entries.remove(pos);
        }
        removed
    }

    /// Removes `id` from every event. Returns the number of subscriptions removed.
    pub(crate) fn remove_everywhere(&mut self, id: ListenerId) -> usize {
        let mut removed = 0;
        for entry in &mut self.entries {
            let before = entry.listeners.len();
            entry.listeners.retain(|h| h.id() != id);
            removed += before - entry.listeners.len();
        }
        self.entries.retain(|e| !e.listeners.is_empty());
        removed
    }

    /// Removes every listener in `ids` from every event.
    pub(crate) fn prune(&mut self, ids: &[ListenerId]) {
        for id in ids {
            self.remove_everywhere(*id);
        }
    }

    /// Clones the current listener set for `event`.
    pub(crate) fn snapshot(&self, event: &str) -> Vec<ListenerHandle> {
        self.entry(event)
            .map(|e| e.listeners.clone())
            .unwrap_or_default()
    }

    /// Event names in first-subscription order.
    pub(crate) fn events(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.event.to_string()).collect()
    }

    /// Number of listeners subscribed to `event`.
    pub(crate) fn count(&self, event: &str) -> usize {
        self.entry(event).map_or(0, |e| e.listeners.len())
    }
}

/// Broker-wide delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Calls to `emit` processed.
    pub emitted: u64,
    /// Messages accepted into a mailbox (one per listener per emission).
    pub delivered: u64,
    /// Messages discarded because a mailbox was full or its listener gone.
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    emitted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            emitted: self.emitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Enqueues `message` into every listener of a snapshot. Called outside the registry lock.
///
/// Returns the ids of stopped listeners so the caller can prune them.
pub(crate) fn fan_out(
    listeners: &[ListenerHandle],
    message: &Message,
    counters: &Counters,
    verbose: bool,
) -> Vec<ListenerId> {
    counters.emitted.fetch_add(1, Ordering::Relaxed);
    let mut closed = Vec::new();
    for listener in listeners {
        match listener.enqueue(message.clone()) {
            Delivery::Enqueued => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            outcome @ (Delivery::Dropped | Delivery::Closed) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                if outcome == Delivery::Closed {
                    closed.push(listener.id());
                }
                if verbose {
                    debug!(
                        listener = listener.name(),
                        event = message.event(),
                        ?outcome,
                        "message dropped"
                    );
                }
            }
        }
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Payload;
    use crate::listeners::Domain;
    use crate::mailbox::{self, Inbox};

    fn handle(cap: usize) -> (ListenerHandle, Inbox) {
        let (mb, inbox) = mailbox::channel(cap).unwrap();
        (ListenerHandle::new("l", Domain::Thread, mb), inbox)
    }

    #[test]
    fn insertion_order_is_preserved() {
        let (h, _i) = handle(1);
        let mut reg = Registry::default();
        for ev in ["wake_up", "chat_done", "alpha"] {
            assert!(reg.insert(ev, h.clone()));
        }
        assert_eq!(reg.events(), vec!["wake_up", "chat_done", "alpha"]);
    }

    #[test]
    fn set_semantics_and_cleanup() {
        let (a, _ia) = handle(1);
        let (b, _ib) = handle(1);
        let mut reg = Registry::default();
        assert!(reg.insert("e", a.clone()));
        assert!(!reg.insert("e", a.clone()));
        assert!(reg.insert("e", b.clone()));
        assert_eq!(reg.count("e"), 2);

        assert!(reg.remove("e", a.id()));
        assert!(!reg.remove("e", a.id()));
        assert_eq!(reg.count("e"), 1);

        assert!(reg.remove("e", b.id()));
        assert!(reg.events().is_empty());
        assert!(!reg.remove("missing", b.id()));
    }

    #[test]
    fn remove_everywhere_drops_empty_entries() {
        let (a, _ia) = handle(1);
        let (b, _ib) = handle(1);
        let mut reg = Registry::default();
        reg.insert("x", a.clone());
        reg.insert("y", a.clone());
        reg.insert("y", b.clone());
        assert_eq!(reg.remove_everywhere(a.id()), 2);
        assert_eq!(reg.events(), vec!["y"]);
        assert_eq!(reg.snapshot("y"), vec![b]);
    }

    #[test]
    fn fan_out_counts_outcomes() {
        let (full, _keep) = handle(1);
        let (open, mut inbox) = handle(4);
        full.enqueue(Message::new("pre", Payload::empty()));

        let counters = Counters::default();
        let msg = Message::new("e", Payload::new(1u8));
        let closed = fan_out(&[full, open], &msg, &counters, true);
        assert!(closed.is_empty());

        assert_eq!(
            counters.snapshot(),
            BrokerStats {
                emitted: 1,
                delivered: 1,
                dropped: 1
            }
        );
        assert_eq!(inbox.try_next().unwrap().event(), "e");
    }

    #[test]
    fn fan_out_reports_stopped_listeners_for_pruning() {
        let (stopped, _is) = handle(2);
        let (live, _il) = handle(2);
        stopped.stop();

        let mut reg = Registry::default();
        reg.insert("x", stopped.clone());
        reg.insert("y", stopped.clone());
        reg.insert("y", live.clone());

        let counters = Counters::default();
        let closed = fan_out(&reg.snapshot("y"), &Message::new("y", Payload::empty()), &counters, false);
        assert_eq!(closed, vec![stopped.id()]);

        reg.prune(&closed);
        assert_eq!(reg.events(), vec!["y"]);
        assert_eq!(reg.snapshot("y"), vec![live]);
    }
}
