//! Messages and the event vocabulary.
//!
//! This module groups the **data model** carried through both brokers and the
//! **vocabulary** collaborators agree on out-of-band.
//!
//! ## Contents
//! - [`Message`], [`Payload`] an immutable `(event name, opaque payload)` pair
//! - [`vocabulary`] event-name constants and the payload shapes used with them
//!
//! The broker enforces nothing beyond the pair: producers and consumers of an
//! event name agree on the payload type by convention and use
//! [`Payload::downcast_ref`] on the receiving side.

mod message;
pub mod vocabulary;

pub use message::{Message, Payload};
