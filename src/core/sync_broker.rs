//! # Thread-domain broker.
//!
//! [`SyncBroker`] routes messages to listeners that each run on a dedicated OS
//! thread. Use it for consumers whose handlers block (audio devices, recognizers,
//! file or database writes).
//!
//! ## Architecture
//! ```text
//! emit(event, payload)
//!     │  lock ─► snapshot listeners(event) ─► unlock
//!     │
//!     ├──► [mailbox 1] ──► thread 1: drain ─► idle ─► sleep(tick) ─► ...
//!     ├──► [mailbox 2] ──► thread 2: drain ─► idle ─► sleep(tick) ─► ...
//!     └──► [mailbox N] ──► thread N
//! ```
//!
//! ## Rules
//! - **Short critical sections**: the registry lock covers mutations and the snapshot only;
//!   enqueueing happens outside it.
//! - **Non-blocking emit**: a full mailbox drops the message for that listener only.
//! - **Per-listener FIFO**, no ordering across listeners or event names.
//!
//! ## Example
//! ```rust
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use chatbus::{BrokerConfig, Payload, SyncBroker};
//!
//! let broker = SyncBroker::new(BrokerConfig::default());
//! let (tx, rx) = mpsc::channel();
//! broker.subscribe_fn("ping", move |p: Payload| {
//!     tx.send(*p.downcast_ref::<u32>().unwrap())?;
//!     Ok(())
//! })?;
//!
//! broker.emit("ping", Payload::new(7_u32));
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 7);
//! # Ok::<(), chatbus::BrokerError>(())
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::config::BrokerConfig;
use crate::core::registry::{self, BrokerStats, Counters, Registry};
use crate::error::BrokerError;
use crate::events::{Message, Payload};
use crate::listeners::{CallbackListener, Domain, Listener, ListenerHandle, worker};
use crate::mailbox;

struct Inner {
    cfg: BrokerConfig,
    registry: Mutex<Registry>,
    counters: Counters,
}

/// Publish/subscribe broker for the thread domain.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SyncBroker {
    inner: Arc<Inner>,
}

impl SyncBroker {
    /// Creates an empty broker.
    pub fn new(cfg: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                registry: Mutex::new(Registry::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Configuration this broker was created with.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.cfg
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts `listener` on its own thread without subscribing it to anything.
    ///
    /// Use [`attach`](Self::attach) to register it under one or more events.
    ///
    /// # Errors
    /// - [`BrokerError::ZeroCapacity`] if `capacity == 0`
    /// - [`BrokerError::Spawn`] if the thread cannot be created
    pub fn spawn<L: Listener>(
        &self,
        listener: L,
        capacity: usize,
    ) -> Result<ListenerHandle, BrokerError> {
        let (mailbox, inbox) = mailbox::channel(capacity)?;
        let handle = ListenerHandle::new(listener.name(), Domain::Thread, mailbox);
        worker::spawn_thread(
            listener,
            inbox,
            handle.lifecycle(),
            self.inner.cfg.tick_clamped(),
        )?;
        Ok(handle)
    }

    /// Starts `listener` and subscribes it to `event` with the default capacity.
    pub fn subscribe<L: Listener>(
        &self,
        event: &str,
        listener: L,
    ) -> Result<ListenerHandle, BrokerError> {
        self.subscribe_with_capacity(event, listener, self.inner.cfg.default_capacity)
    }

    /// Starts `listener` with a mailbox of `capacity` and subscribes it to `event`.
    pub fn subscribe_with_capacity<L: Listener>(
        &self,
        event: &str,
        listener: L,
        capacity: usize,
    ) -> Result<ListenerHandle, BrokerError> {
        let handle = self.spawn(listener, capacity)?;
        self.attach(event, &handle)?;
        Ok(handle)
    }

    /// Wraps `f` in a [`CallbackListener`] and subscribes it with the default capacity.
    pub fn subscribe_fn<F>(&self, event: &str, f: F) -> Result<ListenerHandle, BrokerError>
    where
        F: FnMut(Payload) -> anyhow::Result<()> + Send + 'static,
    {
        self.subscribe_fn_with_capacity(event, f, self.inner.cfg.default_capacity)
    }

    /// Wraps `f` in a [`CallbackListener`] with a mailbox of `capacity`.
    pub fn subscribe_fn_with_capacity<F>(
        &self,
        event: &str,
        f: F,
        capacity: usize,
    ) -> Result<ListenerHandle, BrokerError>
    where
        F: FnMut(Payload) -> anyhow::Result<()> + Send + 'static,
    {
        let listener = CallbackListener::new(format!("callback:{event}"), f);
        self.subscribe_with_capacity(event, listener, capacity)
    }

    /// Registers an already running listener under `event`.
    ///
    /// # Errors
    /// [`BrokerError::DomainMismatch`] if `handle` was created by a cooperative broker.
    pub fn attach(&self, event: &str, handle: &ListenerHandle) -> Result<(), BrokerError> {
        if handle.domain() != Domain::Thread {
            return Err(BrokerError::DomainMismatch {
                listener: handle.name().to_string(),
                expected: Domain::Thread,
                actual: handle.domain(),
            });
        }
        let mut reg = self.registry();
        let added = reg.insert(event, handle.clone());
        if self.inner.cfg.verbose && added {
            debug!(
                event,
                listener = handle.name(),
                subscribers = reg.count(event),
                "subscribed"
            );
        }
        Ok(())
    }

    /// Removes `handle` from `event`. No-op if it is not subscribed.
    ///
    /// The listener keeps running while other subscriptions or handle clones exist.
    pub fn unsubscribe(&self, event: &str, handle: &ListenerHandle) {
        let removed = self.registry().remove(event, handle.id());
        if self.inner.cfg.verbose && removed {
            debug!(event, listener = handle.name(), "unsubscribed");
        }
    }

    /// Removes `handle` from every event it is subscribed to.
    pub fn unsubscribe_all(&self, handle: &ListenerHandle) {
        self.registry().remove_everywhere(handle.id());
    }

    /// Delivers `payload` to every listener currently subscribed to `event`.
    ///
    /// Returns before any handler runs. Listeners whose mailbox is full miss the message.
    /// Stopped listeners are unsubscribed from every event here.
    pub fn emit(&self, event: &str, payload: Payload) {
        let listeners = self.registry().snapshot(event);
        if self.inner.cfg.verbose {
            debug!(event, payload = ?payload, listeners = listeners.len(), "emit");
        }
        let message = Message::new(event, payload);
        let closed = registry::fan_out(
            &listeners,
            &message,
            &self.inner.counters,
            self.inner.cfg.verbose,
        );
        if !closed.is_empty() {
            self.registry().prune(&closed);
        }
    }

    /// Emits a signal-only event.
    pub fn emit_signal(&self, event: &str) {
        self.emit(event, Payload::empty());
    }

    /// Event names with at least one subscriber, in first-subscription order.
    pub fn events(&self) -> Vec<String> {
        self.registry().events()
    }

    /// Number of listeners subscribed to `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.registry().count(event)
    }

    /// Broker-wide delivery counters.
    pub fn stats(&self) -> BrokerStats {
        self.inner.counters.snapshot()
    }
}

impl Default for SyncBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl fmt::Debug for SyncBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncBroker")
            .field("events", &self.events())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(100);

    fn broker() -> SyncBroker {
        SyncBroker::new(BrokerConfig::default().with_tick(Duration::from_millis(2)))
    }

    fn collector(broker: &SyncBroker, event: &str) -> (ListenerHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        let handle = broker
            .subscribe_fn(event, move |p: Payload| {
                tx.send(p.downcast_ref::<String>().cloned().unwrap_or_default())?;
                Ok(())
            })
            .unwrap();
        (handle, rx)
    }

    fn say(broker: &SyncBroker, event: &str, text: &str) {
        broker.emit(event, Payload::new(text.to_string()));
    }

    #[test]
    fn every_subscriber_receives_the_payload() {
        let b = broker();
        let (_h1, rx1) = collector(&b, "chat_user_input");
        let (_h2, rx2) = collector(&b, "chat_user_input");
        say(&b, "chat_user_input", "hello");
        assert_eq!(rx1.recv_timeout(WAIT).unwrap(), "hello");
        assert_eq!(rx2.recv_timeout(WAIT).unwrap(), "hello");
        assert_eq!(b.stats().delivered, 2);
    }

    #[test]
    fn order_is_preserved_per_listener() {
        let b = broker();
        let (_h, rx) = collector(&b, "e");
        for p in ["p1", "p2", "p3"] {
            say(&b, "e", p);
        }
        let got: Vec<String> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn failing_handler_keeps_receiving() {
        let b = broker();
        let (tx, rx) = mpsc::channel();
        let h = b
            .subscribe_fn("e", move |p: Payload| {
                let text = p.downcast_ref::<String>().cloned().unwrap_or_default();
                if text == "p1" {
                    anyhow::bail!("cannot handle {text}");
                }
                tx.send(text)?;
                Ok(())
            })
            .unwrap();
        say(&b, "e", "p1");
        say(&b, "e", "p2");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "p2");
        assert_eq!(h.stats().failed, 1);
    }

    #[test]
    fn unsubscribe_stops_delivery_to_that_listener_only() {
        let b = broker();
        let (gone, rx_gone) = collector(&b, "e");
        let (_stay, rx_stay) = collector(&b, "e");

        b.unsubscribe("e", &gone);
        b.unsubscribe("e", &gone);
        say(&b, "e", "after");

        assert_eq!(rx_stay.recv_timeout(WAIT).unwrap(), "after");
        assert!(rx_gone.recv_timeout(QUIET).is_err());
        assert_eq!(b.subscriber_count("e"), 1);
    }

    #[test]
    fn last_unsubscribe_removes_event() {
        let b = broker();
        let (h, _rx) = collector(&b, "first");
        let (_h2, _rx2) = collector(&b, "second");
        assert_eq!(b.events(), vec!["first", "second"]);
        b.unsubscribe("first", &h);
        assert_eq!(b.events(), vec!["second"]);
    }

    #[test]
    fn stop_is_idempotent() {
        let b = broker();
        let (h, rx) = collector(&b, "e");
        h.stop();
        h.stop();
        say(&b, "e", "ignored");
        assert!(rx.recv_timeout(QUIET).is_err());
        assert!(!h.is_running());
    }

    #[test]
    fn stopped_listener_is_pruned_on_next_emit() {
        let b = broker();
        let (h, _rx) = collector(&b, "e");
        b.attach("other", &h).unwrap();
        let (_live, rx_live) = collector(&b, "e");

        h.stop();
        say(&b, "e", "first");
        assert_eq!(rx_live.recv_timeout(WAIT).unwrap(), "first");
        assert_eq!(b.subscriber_count("e"), 1);
        assert_eq!(b.events(), vec!["e"]);

        say(&b, "e", "second");
        assert_eq!(rx_live.recv_timeout(WAIT).unwrap(), "second");
        assert_eq!(b.stats().dropped, 1);
    }

    #[test]
    fn one_listener_under_many_events() {
        let b = broker();
        let (h, rx) = collector(&b, "a");
        b.attach("b", &h).unwrap();
        say(&b, "a", "from-a");
        say(&b, "b", "from-b");
        let mut got: Vec<String> = (0..2).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        got.sort();
        assert_eq!(got, vec!["from-a", "from-b"]);

        b.unsubscribe_all(&h);
        assert!(b.events().is_empty());
    }

    #[test]
    fn zero_capacity_fails_fast() {
        let b = broker();
        let err = b
            .subscribe_fn_with_capacity("e", |_p: Payload| Ok(()), 0)
            .unwrap_err();
        assert!(matches!(err, BrokerError::ZeroCapacity));
        assert!(b.events().is_empty());
    }

    /// Parks in `idle` until released, so the test controls when the next drain happens.
    struct Gated {
        out: mpsc::Sender<String>,
        parked: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
        gated: bool,
    }

    impl Listener for Gated {
        fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
            self.out
                .send(payload.downcast_ref::<String>().cloned().unwrap_or_default())?;
            Ok(())
        }

        fn idle(&mut self) {
            if self.gated {
                self.gated = false;
                let _ = self.parked.send(());
                let _ = self.release.recv();
            }
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    #[test]
    fn full_mailbox_drops_newest() {
        let b = broker();
        let (out_tx, out_rx) = mpsc::channel();
        let (parked_tx, parked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let h = b
            .subscribe_with_capacity(
                "ping",
                Gated {
                    out: out_tx,
                    parked: parked_tx,
                    release: release_rx,
                    gated: true,
                },
                2,
            )
            .unwrap();

        parked_rx.recv_timeout(WAIT).unwrap();
        for p in ["a", "b", "c"] {
            say(&b, "ping", p);
        }
        release_tx.send(()).unwrap();

        assert_eq!(out_rx.recv_timeout(WAIT).unwrap(), "a");
        assert_eq!(out_rx.recv_timeout(WAIT).unwrap(), "b");
        assert!(out_rx.recv_timeout(QUIET).is_err());

        let stats = h.stats();
        assert_eq!((stats.enqueued, stats.dropped), (2, 1));
        assert_eq!(b.stats().dropped, 1);
    }
}
