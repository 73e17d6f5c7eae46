//! # chatbus
//!
//! **chatbus** is an in-process publish/subscribe backbone for applications whose
//! components live on two incompatible schedules: preemptive worker threads
//! (microphone capture, model clients, audio playback) and one cooperative event loop
//! (UI, dialog logic).
//!
//! Producers emit `(event name, payload)` pairs and never learn who consumed them.
//! Each consumer owns a bounded mailbox; when it is full the newest message is
//! dropped and the emitter carries on.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   producer threads                            cooperative callers
//!   (mic, LLM client, player)                   (UI, dialog)
//!          │ emit(event, payload)                     │ emit / subscribe
//!          ▼                                          ▼
//! ┌───────────────────────────────┐        ┌───────────────────────────────────┐
//! │ SyncBroker                    │        │ CoopBroker                        │
//! │  - Registry (ordered, locked) │ relay  │  - command queue (unbounded)      │
//! │  - snapshot → enqueue         │ ─────► │  - loop thread: current-thread rt │
//! └──────┬───────────┬────────────┘ (opt.) │  - Registry applied on the loop   │
//!        ▼           ▼                     └──────┬───────────┬────────────────┘
//!   ┌─────────┐ ┌─────────┐                       ▼           ▼
//!   │ Mailbox │ │ Mailbox │  bounded,        ┌─────────┐ ┌─────────┐
//!   └────┬────┘ └────┬────┘  drop-newest     │ Mailbox │ │ Mailbox │
//!        ▼           ▼                       └────┬────┘ └────┬────┘
//!   OS thread    OS thread                        ▼           ▼
//!   drain → idle → sleep(tick)                 task         task
//!   Listener::handle                          AsyncListener::handle().await
//! ```
//!
//! ### Lifecycle
//! ```text
//! subscribe ──► ListenerHandle (Created) ──► worker starts (Running)
//!                                           │
//!     stop() / last handle dropped ─────────┴──► Stopped (mailbox closed, worker exits)
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                              |
//! |-------------------|----------------------------------------------------------------|-------------------------------------------------|
//! | **Brokers**       | Thread-per-listener and single-loop publish/subscribe.         | [`SyncBroker`], [`CoopBroker`]                  |
//! | **Listeners**     | Mailbox-owning consumers, hand-written or from closures.       | [`Listener`], [`AsyncListener`], [`CallbackListener`], [`AsyncCallbackListener`] |
//! | **Messages**      | Event name plus a shared, type-erased payload.                 | [`Message`], [`Payload`], [`vocabulary`]        |
//! | **Diagnostics**   | Per-listener and per-broker delivery counters.                 | [`ListenerStats`], [`BrokerStats`]              |
//! | **Logging**       | Component-tagged log lines published as events.                | [`Logger`], [`Loggable`]                        |
//! | **Errors**        | Setup-time misuse reported to the caller.                      | [`BrokerError`]                                 |
//! | **Configuration** | Tick, default capacity, verbosity.                             | [`BrokerConfig`]                                |
//!
//! ## Example
//! ```rust
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use chatbus::{BrokerConfig, Payload, SyncBroker};
//! use chatbus::vocabulary::{CHAT_RESPONSE, ChatResponse};
//!
//! let broker = SyncBroker::new(BrokerConfig::default());
//! let (tx, rx) = mpsc::channel();
//!
//! broker.subscribe_fn(CHAT_RESPONSE, move |p: Payload| {
//!     if let Some(resp) = p.downcast_ref::<ChatResponse>() {
//!         tx.send(resp.msg.clone())?;
//!     }
//!     Ok(())
//! })?;
//!
//! broker.emit(CHAT_RESPONSE, Payload::new(ChatResponse::text("hello", "happy")));
//! assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "hello");
//! # Ok::<(), chatbus::BrokerError>(())
//! ```
mod config;
mod core;
mod error;
mod events;
mod listeners;
mod loggable;
pub mod mailbox;

// ---- Public re-exports ----

pub use crate::config::BrokerConfig;
pub use crate::core::global;
pub use crate::core::{BrokerStats, CoopBroker, SyncBroker};
pub use crate::error::BrokerError;
pub use crate::events::vocabulary;
pub use crate::events::{Message, Payload};
pub use crate::listeners::{
    AsyncCallbackListener, AsyncListener, CallbackListener, Domain, Listener, ListenerHandle,
    ListenerId, ListenerState,
};
pub use crate::loggable::{Loggable, Logger};
pub use crate::mailbox::{Delivery, ListenerStats};
