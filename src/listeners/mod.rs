//! # Listeners: independent consumers owning a mailbox and a handler.
//!
//! This module provides the two listener traits and their single-handler wrappers:
//!
//! | Domain        | Full listener       | Single handler             | Driven by                         |
//! |---------------|---------------------|----------------------------|-----------------------------------|
//! | Thread        | [`Listener`]        | [`CallbackListener`]       | one OS thread, fixed polling tick |
//! | Cooperative   | [`AsyncListener`]   | [`AsyncCallbackListener`]  | one task on the shared loop       |
//!
//! ## Architecture
//! ```text
//! Broker::emit ──► ListenerHandle::enqueue ──► [mailbox] ──► worker loop ──► handle(event, payload)
//!                                                             │                 │
//!                                                             │          Err / panic caught,
//!                                                             │          logged, loop continues
//!                                                             └── stop() observed at next iteration
//! ```
//!
//! ## Rules
//! - A listener owns its mailbox and its state; nothing else touches them.
//! - At most one drain loop runs per listener.
//! - Lifecycle is `Created → Running → Stopped`; a stopped listener is never restarted.
//! - Handler failures never reach the emitter and never stop the loop.

mod callback;
mod handle;
mod listener;
pub(crate) mod worker;

pub use callback::{AsyncCallbackListener, CallbackListener};
pub use handle::{Domain, ListenerHandle, ListenerId, ListenerState};
pub use listener::{AsyncListener, Listener};
