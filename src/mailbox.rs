//! # Bounded per-listener mailbox.
//!
//! A mailbox is a bounded FIFO of [`Message`]s split into two halves:
//! - [`Mailbox`]: the enqueue side, cloned into broker registries and called from any thread;
//! - [`Inbox`]: the drain side, owned by exactly one listener loop.
//!
//! ## Rules
//! - **Non-blocking**: [`Mailbox::enqueue`] uses `try_send` and returns immediately.
//! - **Drop-newest**: when full, the incoming message is discarded and queued ones are kept.
//! - **Per-listener FIFO**: the inbox yields messages in enqueue order.
//! - **Silent**: the emitter never learns about drops; they are only counted.
//!
//! ```text
//! emit ──► Mailbox::enqueue ──► [ m1 | m2 | .. | mN ] ──► Inbox::try_next / next ──► handle()
//!                 │ full
//!                 └──► dropped += 1 (message discarded)
//! ```
//!
//! Both domains share this type: thread listeners poll with [`Inbox::try_next`],
//! cooperative listeners await [`Inbox::next`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::BrokerError;
use crate::events::Message;

/// Outcome of a single enqueue attempt.
///
/// Used for bookkeeping; brokers do not surface it to emitters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Message appended to the tail.
    Enqueued,
    /// Mailbox was full; message discarded.
    Dropped,
    /// The owning listener is gone; message discarded.
    Closed,
}

/// Snapshot of a listener's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Messages accepted into the mailbox.
    pub enqueued: u64,
    /// Messages discarded because the mailbox was full.
    pub dropped: u64,
    /// Messages whose handler returned `Ok`.
    pub handled: u64,
    /// Messages whose handler returned `Err` or panicked.
    pub failed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    handled: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Creates a mailbox holding at most `capacity` messages.
///
/// # Errors
/// [`BrokerError::ZeroCapacity`] if `capacity == 0`.
///
/// # Example
/// ```rust
/// use chatbus::{Message, Payload, mailbox::{self, Delivery}};
///
/// let (mailbox, mut inbox) = mailbox::channel(1).unwrap();
/// assert_eq!(mailbox.enqueue(Message::new("a", Payload::empty())), Delivery::Enqueued);
/// assert_eq!(mailbox.enqueue(Message::new("b", Payload::empty())), Delivery::Dropped);
/// assert_eq!(inbox.try_next().unwrap().event(), "a");
/// assert!(inbox.try_next().is_none());
/// ```
pub fn channel(capacity: usize) -> Result<(Mailbox, Inbox), BrokerError> {
    if capacity == 0 {
        return Err(BrokerError::ZeroCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    let counters = Arc::new(Counters::default());
    Ok((
        Mailbox {
            tx,
            counters: Arc::clone(&counters),
        },
        Inbox { rx, counters },
    ))
}

/// Enqueue side of a mailbox. Cheap to clone; safe to call from any thread.
#[derive(Clone, Debug)]
pub struct Mailbox {
    tx: mpsc::Sender<Message>,
    counters: Arc<Counters>,
}

impl Mailbox {
    /// Appends `message` unless the mailbox is full or closed. Never blocks.
    pub fn enqueue(&self, message: Message) -> Delivery {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Delivery::Enqueued
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity chosen at creation.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Returns `true` once the drain side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ListenerStats {
        self.counters.snapshot()
    }
}

/// Drain side of a mailbox, owned by one listener loop.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<Message>,
    counters: Arc<Counters>,
}

impl Inbox {
    /// Pops the head without waiting. `None` when empty or closed.
    pub fn try_next(&mut self) -> Option<Message> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the head. `None` once every [`Mailbox`] clone is dropped and the queue is empty.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) fn record_handled(&self) {
        self.counters.handled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }
}
