//! # Listener handles and lifecycle.
//!
//! A [`ListenerHandle`] is the broker-facing identity of a running listener: it
//! owns the enqueue side of the mailbox and the lifecycle cell shared with the
//! worker loop. Handles are cheap to clone; registries store clones.
//!
//! ## Lifecycle
//! ```text
//! Created ──(worker starts)──► Running ──(stop / last handle dropped)──► Stopped
//!    └──────────────────(stop before start)────────────────────────────────┘
//! ```
//! `Stopped` is terminal. Stop is cooperative: the worker notices it at the next
//! loop iteration and an in-flight handler always runs to completion.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::events::Message;
use crate::mailbox::{Delivery, ListenerStats, Mailbox};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique listener identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Concurrency domain a listener is driven by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    /// One OS thread per listener, polling on a fixed tick.
    Thread,
    /// One task per listener on the shared cooperative loop.
    Cooperative,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Domain::Thread => "thread",
            Domain::Cooperative => "cooperative",
        })
    }
}

/// Observable lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    /// Handle exists; the worker has not entered its loop yet.
    Created = 0,
    /// The worker loop is draining the mailbox.
    Running = 1,
    /// Stop was requested or the worker exited. Terminal.
    Stopped = 2,
}

impl ListenerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ListenerState::Created,
            1 => ListenerState::Running,
            _ => ListenerState::Stopped,
        }
    }
}

/// Lifecycle cell shared between a handle and its worker.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
    cancel: CancellationToken,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(ListenerState::Created as u8),
            cancel: CancellationToken::new(),
        }
    }

    /// `Created → Running`. Returns `false` if the listener was stopped first.
    pub(crate) fn mark_running(&self) -> bool {
        self.state
            .compare_exchange(
                ListenerState::Created as u8,
                ListenerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Requests a stop. Idempotent.
    pub(crate) fn stop(&self) {
        self.state
            .store(ListenerState::Stopped as u8, Ordering::Release);
        self.cancel.cancel();
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub(crate) fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

struct HandleInner {
    id: ListenerId,
    name: Arc<str>,
    domain: Domain,
    mailbox: Mailbox,
    lifecycle: Arc<Lifecycle>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.lifecycle.stop();
    }
}

/// Shared handle to a running listener.
///
/// Equality and hashing use the [`ListenerId`] only. When the last clone is
/// dropped (including the clones held by broker registries) the listener stops.
#[derive(Clone)]
pub struct ListenerHandle {
    inner: Arc<HandleInner>,
}

impl ListenerHandle {
    pub(crate) fn new(name: &str, domain: Domain, mailbox: Mailbox) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: ListenerId::next(),
                name: Arc::from(name),
                domain,
                mailbox,
                lifecycle: Arc::new(Lifecycle::new()),
            }),
        }
    }

    pub(crate) fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.inner.lifecycle)
    }

    /// Unique identity.
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    /// Listener name as reported by the listener at subscribe time.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Domain this listener is driven by.
    pub fn domain(&self) -> Domain {
        self.inner.domain
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.inner.lifecycle.state()
    }

    /// Returns `true` while the worker loop is (or is about to be) draining.
    pub fn is_running(&self) -> bool {
        !self.inner.lifecycle.is_stop_requested()
    }

    /// Requests a cooperative stop. Safe to call any number of times.
    ///
    /// The worker exits at its next loop iteration; a handler already running
    /// completes normally. Messages still queued are discarded. Brokers keep the
    /// subscription until their next emit to it, then drop it from every event.
    pub fn stop(&self) {
        self.inner.lifecycle.stop();
    }

    /// Counter snapshot for this listener's mailbox.
    pub fn stats(&self) -> ListenerStats {
        self.inner.mailbox.stats()
    }

    /// Mailbox capacity.
    pub fn capacity(&self) -> usize {
        self.inner.mailbox.capacity()
    }

    /// Messages waiting in the mailbox.
    pub fn pending(&self) -> usize {
        self.inner.mailbox.len()
    }

    /// Best-effort enqueue of `message` into this listener's mailbox.
    pub fn enqueue(&self, message: Message) -> Delivery {
        if self.inner.lifecycle.is_stop_requested() {
            return Delivery::Closed;
        }
        self.inner.mailbox.enqueue(message)
    }
}

impl PartialEq for ListenerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ListenerHandle {}

impl Hash for ListenerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("domain", &self.inner.domain)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Payload;
    use crate::mailbox;

    fn handle(cap: usize) -> (ListenerHandle, mailbox::Inbox) {
        let (mb, inbox) = mailbox::channel(cap).unwrap();
        (ListenerHandle::new("test", Domain::Thread, mb), inbox)
    }

    #[test]
    fn ids_are_unique_and_drive_equality() {
        let (a, _ia) = handle(1);
        let (b, _ib) = handle(1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn lifecycle_transitions() {
        let (h, _inbox) = handle(1);
        let lc = h.lifecycle();
        assert_eq!(h.state(), ListenerState::Created);
        assert!(lc.mark_running());
        assert_eq!(h.state(), ListenerState::Running);
        assert!(!lc.mark_running());

        h.stop();
        h.stop();
        assert_eq!(h.state(), ListenerState::Stopped);
        assert!(!h.is_running());
        assert!(!lc.mark_running(), "stopped is terminal");
    }

    #[test]
    fn stop_before_start_prevents_running() {
        let (h, _inbox) = handle(1);
        h.stop();
        assert!(!h.lifecycle().mark_running());
        assert_eq!(h.state(), ListenerState::Stopped);
    }

    #[test]
    fn dropping_last_handle_stops_listener() {
        let (h, _inbox) = handle(1);
        let lc = h.lifecycle();
        let clone = h.clone();
        drop(h);
        assert!(!lc.is_stop_requested());
        drop(clone);
        assert!(lc.is_stop_requested());
        assert_eq!(lc.state(), ListenerState::Stopped);
    }

    #[test]
    fn stopped_handle_rejects_messages() {
        let (h, mut inbox) = handle(2);
        assert_eq!(h.enqueue(Message::new("a", Payload::empty())), Delivery::Enqueued);
        assert_eq!(h.pending(), 1);
        h.stop();
        assert_eq!(h.enqueue(Message::new("b", Payload::empty())), Delivery::Closed);
        assert_eq!(inbox.try_next().unwrap().event(), "a");
        assert!(inbox.try_next().is_none());
    }
}
