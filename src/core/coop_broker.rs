//! # Cooperative-domain broker.
//!
//! [`CoopBroker`] drives all of its listeners as tasks on **one** event loop: a
//! tokio current-thread runtime living on a dedicated background thread. Public
//! methods are callable from any thread and never wait for the loop; they post a
//! [`Command`] over an unbounded channel and return.
//!
//! ## Architecture
//! ```text
//! any thread                       loop thread (current-thread runtime)
//! ──────────                       ────────────────────────────────────
//! subscribe ─┐                     EventLoop::run
//! attach    ─┼─► post(Command) ──►   ├─ Spawn(task)   → tokio::spawn(listener loop)
//! unsubscribe┤   (unbounded mpsc)    ├─ Attach/Remove → registry (under lock)
//! emit      ─┘                       └─ Emit(msg)     → snapshot → enqueue each mailbox
//!                                                          │
//!                                     listener task 1 ◄────┤ await mailbox → handle().await
//!                                     listener task N ◄────┘
//! ```
//!
//! ## Rules
//! - Commands from one thread are applied in the order they were posted, so
//!   `subscribe` followed by `emit` on the same thread always sees the subscription.
//! - Handlers must not block; a blocking handler stalls every cooperative listener
//!   and every pending command.
//! - When the last clone of the broker is dropped, the loop drains its queue,
//!   exits, and the runtime shuts down its listener tasks.
//!
//! ## Example
//! ```rust
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use chatbus::{BrokerConfig, CoopBroker, Payload};
//!
//! let broker = CoopBroker::start(BrokerConfig::default())?;
//! let (tx, rx) = mpsc::channel();
//! broker.subscribe_fn("chat_response", move |p: Payload| {
//!     let tx = tx.clone();
//!     async move {
//!         tokio::task::yield_now().await;
//!         tx.send(p.downcast_ref::<String>().cloned())?;
//!         Ok::<(), anyhow::Error>(())
//!     }
//! })?;
//!
//! broker.emit("chat_response", Payload::new(String::from("hi")));
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap().as_deref(), Some("hi"));
//! # Ok::<(), chatbus::BrokerError>(())
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::core::registry::{self, BrokerStats, Counters, Registry};
use crate::core::sync_broker::SyncBroker;
use crate::error::BrokerError;
use crate::events::{Message, Payload};
use crate::listeners::{
    AsyncCallbackListener, AsyncListener, Domain, Listener, ListenerHandle, ListenerId, worker,
};
use crate::mailbox;

/// Unit of work posted to the loop.
enum Command {
    Spawn(BoxFuture<'static, ()>),
    Attach {
        event: Arc<str>,
        handle: ListenerHandle,
    },
    Unsubscribe {
        event: Arc<str>,
        id: ListenerId,
    },
    UnsubscribeAll {
        id: ListenerId,
    },
    Emit(Message),
}

struct Shared {
    registry: Mutex<Registry>,
    counters: Counters,
    verbose: bool,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loop-side state: the command receiver plus the shared registry.
struct EventLoop {
    rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
}

impl EventLoop {
    async fn run(mut self) {
        debug!("cooperative loop started");
        while let Some(cmd) = self.rx.recv().await {
            self.apply(cmd);
        }
        debug!("cooperative loop stopped");
    }

    fn apply(&self, cmd: Command) {
        let verbose = self.shared.verbose;
        match cmd {
            Command::Spawn(task) => {
                tokio::spawn(task);
            }
            Command::Attach { event, handle } => {
                let mut reg = self.shared.registry();
                if reg.insert(&event, handle.clone()) && verbose {
                    debug!(
                        event = &*event,
                        listener = handle.name(),
                        subscribers = reg.count(&event),
                        "subscribed"
                    );
                }
            }
            Command::Unsubscribe { event, id } => {
                if self.shared.registry().remove(&event, id) && verbose {
                    debug!(event = &*event, %id, "unsubscribed");
                }
            }
            Command::UnsubscribeAll { id } => {
                self.shared.registry().remove_everywhere(id);
            }
            Command::Emit(message) => {
                let listeners = self.shared.registry().snapshot(message.event());
                if verbose {
                    debug!(
                        event = message.event(),
                        payload = ?message.payload(),
                        listeners = listeners.len(),
                        "emit"
                    );
                }
                let closed =
                    registry::fan_out(&listeners, &message, &self.shared.counters, verbose);
                if !closed.is_empty() {
                    self.shared.registry().prune(&closed);
                }
            }
        }
    }
}

struct Inner {
    cfg: BrokerConfig,
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

/// Publish/subscribe broker for the cooperative domain.
///
/// Cheap to clone; clones post to the same loop.
#[derive(Clone)]
pub struct CoopBroker {
    inner: Arc<Inner>,
}

impl CoopBroker {
    /// Builds the runtime and starts the loop thread.
    ///
    /// # Errors
    /// - [`BrokerError::Runtime`] if the runtime cannot be built
    /// - [`BrokerError::Spawn`] if the loop thread cannot be created
    pub fn start(cfg: BrokerConfig) -> Result<Self, BrokerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(BrokerError::Runtime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry::default()),
            counters: Counters::default(),
            verbose: cfg.verbose,
        });
        let event_loop = EventLoop {
            rx,
            shared: Arc::clone(&shared),
        };

        let name = cfg.loop_thread_name.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || runtime.block_on(event_loop.run()))
            .map_err(|source| BrokerError::Spawn { name, source })?;

        Ok(Self {
            inner: Arc::new(Inner { cfg, tx, shared }),
        })
    }

    /// Configuration this broker was created with.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.cfg
    }

    fn post(&self, cmd: Command) -> Result<(), BrokerError> {
        self.inner.tx.send(cmd).map_err(|_| BrokerError::LoopClosed)
    }

    /// Schedules `listener` as a task on the loop without subscribing it.
    ///
    /// # Errors
    /// - [`BrokerError::ZeroCapacity`] if `capacity == 0`
    /// - [`BrokerError::LoopClosed`] if the loop has exited
    pub fn spawn<L: AsyncListener>(
        &self,
        listener: L,
        capacity: usize,
    ) -> Result<ListenerHandle, BrokerError> {
        let (mailbox, inbox) = mailbox::channel(capacity)?;
        let handle = ListenerHandle::new(listener.name(), Domain::Cooperative, mailbox);
        let task = worker::run_task(listener, inbox, handle.lifecycle());
        self.post(Command::Spawn(Box::pin(task)))?;
        Ok(handle)
    }

    /// Schedules `listener` and subscribes it to `event` with the default capacity.
    pub fn subscribe<L: AsyncListener>(
        &self,
        event: &str,
        listener: L,
    ) -> Result<ListenerHandle, BrokerError> {
        self.subscribe_with_capacity(event, listener, self.inner.cfg.default_capacity)
    }

    /// Schedules `listener` with a mailbox of `capacity` and subscribes it to `event`.
    pub fn subscribe_with_capacity<L: AsyncListener>(
        &self,
        event: &str,
        listener: L,
        capacity: usize,
    ) -> Result<ListenerHandle, BrokerError> {
        let handle = self.spawn(listener, capacity)?;
        self.attach(event, &handle)?;
        Ok(handle)
    }

    /// Subscribes a suspending function; its future is awaited per message.
    pub fn subscribe_fn<F, Fut>(&self, event: &str, f: F) -> Result<ListenerHandle, BrokerError>
    where
        F: FnMut(Payload) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe_fn_with_capacity(event, f, self.inner.cfg.default_capacity)
    }

    /// [`subscribe_fn`](Self::subscribe_fn) with an explicit mailbox capacity.
    pub fn subscribe_fn_with_capacity<F, Fut>(
        &self,
        event: &str,
        f: F,
        capacity: usize,
    ) -> Result<ListenerHandle, BrokerError>
    where
        F: FnMut(Payload) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let listener = AsyncCallbackListener::new(format!("callback:{event}"), f);
        self.subscribe_with_capacity(event, listener, capacity)
    }

    /// Subscribes an ordinary function. It runs on the loop, so it must not block.
    pub fn subscribe_immediate_fn<F>(
        &self,
        event: &str,
        f: F,
    ) -> Result<ListenerHandle, BrokerError>
    where
        F: FnMut(Payload) -> anyhow::Result<()> + Send + 'static,
    {
        let listener = AsyncCallbackListener::immediate(format!("callback:{event}"), f);
        self.subscribe(event, listener)
    }

    /// Registers an already scheduled listener under `event`.
    ///
    /// # Errors
    /// - [`BrokerError::DomainMismatch`] if `handle` belongs to the thread domain
    /// - [`BrokerError::LoopClosed`] if the loop has exited
    pub fn attach(&self, event: &str, handle: &ListenerHandle) -> Result<(), BrokerError> {
        if handle.domain() != Domain::Cooperative {
            return Err(BrokerError::DomainMismatch {
                listener: handle.name().to_string(),
                expected: Domain::Cooperative,
                actual: handle.domain(),
            });
        }
        self.post(Command::Attach {
            event: Arc::from(event),
            handle: handle.clone(),
        })
    }

    /// Schedules removal of `handle` from `event`. No-op if it is not subscribed.
    pub fn unsubscribe(&self, event: &str, handle: &ListenerHandle) {
        let _ = self.post(Command::Unsubscribe {
            event: Arc::from(event),
            id: handle.id(),
        });
    }

    /// Schedules removal of `handle` from every event.
    pub fn unsubscribe_all(&self, handle: &ListenerHandle) {
        let _ = self.post(Command::UnsubscribeAll { id: handle.id() });
    }

    /// Schedules delivery of `payload` to the listeners of `event` and returns immediately.
    pub fn emit(&self, event: &str, payload: Payload) {
        let _ = self.post(Command::Emit(Message::new(event, payload)));
    }

    /// Emits a signal-only event.
    pub fn emit_signal(&self, event: &str) {
        self.emit(event, Payload::empty());
    }

    /// Forwards every `event` emitted on `source` into this broker under the same name.
    ///
    /// The two domains stay isolated unless a relay is set up explicitly. The relay is
    /// an ordinary thread-domain listener on `source`; unsubscribe or stop the returned
    /// handle to tear it down. Use [`SyncBroker::attach`] with the handle to relay more
    /// event names through the same thread.
    pub fn relay_from(
        &self,
        source: &SyncBroker,
        event: &str,
    ) -> Result<ListenerHandle, BrokerError> {
        source.subscribe(
            event,
            Relay {
                target: self.clone(),
            },
        )
    }

    /// Event names with at least one subscriber, in first-subscription order.
    ///
    /// Reflects commands the loop has applied so far.
    pub fn events(&self) -> Vec<String> {
        self.inner.shared.registry().events()
    }

    /// Number of listeners subscribed to `event`, as applied by the loop so far.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.shared.registry().count(event)
    }

    /// Broker-wide delivery counters.
    pub fn stats(&self) -> BrokerStats {
        self.inner.shared.counters.snapshot()
    }
}

impl fmt::Debug for CoopBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoopBroker")
            .field("loop_thread", &self.inner.cfg.loop_thread_name)
            .field("events", &self.events())
            .finish_non_exhaustive()
    }
}

/// Thread-domain listener re-emitting into a cooperative broker.
struct Relay {
    target: CoopBroker,
}

impl Listener for Relay {
    fn handle(&mut self, event: &str, payload: &Payload) -> anyhow::Result<()> {
        self.target.emit(event, payload.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "relay"
    }
}
