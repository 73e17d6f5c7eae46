//! # Messages routed by the brokers.
//!
//! A [`Message`] is an immutable pair of an event name and a [`Payload`]. Both
//! halves are reference-counted, so fanning one emission out to N mailboxes costs
//! N pointer copies rather than N deep clones.
//!
//! ## Example
//! ```rust
//! use chatbus::{Message, Payload};
//!
//! let msg = Message::new("chat_done", Payload::new(42_u32));
//! assert_eq!(msg.event(), "chat_done");
//! assert_eq!(msg.payload().downcast_ref::<u32>(), Some(&42));
//! assert!(msg.payload().downcast_ref::<String>().is_none());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased, shareable payload.
///
/// Holds any `Send + Sync + 'static` value behind an `Arc`, or nothing for
/// signal-only events. The broker never inspects it.
#[derive(Clone)]
pub struct Payload {
    value: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl Payload {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wraps an already shared value without re-allocating.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value: Some(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Payload of a signal-only event.
    pub fn empty() -> Self {
        Self {
            value: None,
            type_name: "()",
        }
    }

    /// Returns `true` for [`Payload::empty`].
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Borrows the value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.as_deref()?.downcast_ref::<T>()
    }

    /// Returns a shared handle to the value if it is a `T`.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone()?.downcast::<T>().ok()
    }

    /// Rust type name of the wrapped value, for diagnostics only.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload<{}>", self.type_name)
    }
}

/// Immutable `(event name, payload)` pair.
#[derive(Clone, Debug)]
pub struct Message {
    event: Arc<str>,
    payload: Payload,
}

impl Message {
    /// Creates a message.
    pub fn new(event: impl Into<Arc<str>>, payload: Payload) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Event name this message was emitted under.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Opaque payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Splits the message into its parts.
    pub fn into_parts(self) -> (Arc<str>, Payload) {
        (self.event, self.payload)
    }
}
