//! # Function-backed listeners.
//!
//! [`CallbackListener`] and [`AsyncCallbackListener`] wrap a single function so a
//! bare closure gets full listener semantics: its own mailbox, its own drain loop
//! and its own failure containment. The function receives only the payload.
//!
//! ## Example
//! ```rust
//! use chatbus::{AsyncCallbackListener, CallbackListener, Payload};
//!
//! let sync = CallbackListener::new("printer", |p: Payload| {
//!     println!("{p:?}");
//!     Ok(())
//! });
//!
//! let suspending = AsyncCallbackListener::new("fetcher", |p: Payload| async move {
//!     tokio::task::yield_now().await;
//!     drop(p);
//!     Ok::<(), anyhow::Error>(())
//! });
//!
//! let immediate = AsyncCallbackListener::immediate("counter", |_p: Payload| Ok(()));
//! # let _ = (sync, suspending, immediate);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::events::Payload;
use crate::listeners::{AsyncListener, Listener};

/// Thread-domain listener wrapping `FnMut(Payload) -> anyhow::Result<()>`.
pub struct CallbackListener<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> CallbackListener<F>
where
    F: FnMut(Payload) -> anyhow::Result<()> + Send + 'static,
{
    /// Wraps `f`.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Listener for CallbackListener<F>
where
    F: FnMut(Payload) -> anyhow::Result<()> + Send + 'static,
{
    fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
        (self.f)(payload.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for CallbackListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackListener")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

type ImmediateFn = Box<dyn FnMut(Payload) -> anyhow::Result<()> + Send>;
type SuspendingFn = Box<dyn FnMut(Payload) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

enum Callback {
    Immediate(ImmediateFn),
    Suspending(SuspendingFn),
}

/// Cooperative listener wrapping either an ordinary or a suspending function.
///
/// A suspending function's future is awaited before the message counts as handled;
/// an ordinary one completes immediately.
pub struct AsyncCallbackListener {
    name: Cow<'static, str>,
    callback: Callback,
}

impl AsyncCallbackListener {
    /// Wraps a function returning a future.
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, mut f: F) -> Self
    where
        F: FnMut(Payload) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            callback: Callback::Suspending(Box::new(move |p| Box::pin(f(p)))),
        }
    }

    /// Wraps an ordinary function. It runs on the loop, so it must not block.
    pub fn immediate<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: FnMut(Payload) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            callback: Callback::Immediate(Box::new(f)),
        }
    }

    /// Returns `true` if the wrapped function returns a future.
    pub fn is_suspending(&self) -> bool {
        matches!(self.callback, Callback::Suspending(_))
    }
}

#[async_trait]
impl AsyncListener for AsyncCallbackListener {
    async fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
        match &mut self.callback {
            Callback::Immediate(f) => f(payload.clone()),
            Callback::Suspending(f) => f(payload.clone()).await,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for AsyncCallbackListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCallbackListener")
            .field("name", &self.name)
            .field("suspending", &self.is_suspending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn callback_receives_payload_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut l = CallbackListener::new("collect", move |p: Payload| {
            sink.lock().unwrap().push(*p.downcast_ref::<i32>().unwrap());
            Ok(())
        });
        l.handle("ignored", &Payload::new(1)).unwrap();
        l.handle("also-ignored", &Payload::new(2)).unwrap();
        assert_eq!(l.name(), "collect");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn callback_errors_are_returned() {
        let mut l = CallbackListener::new("fails", |_p: Payload| anyhow::bail!("boom"));
        let err = l.handle("x", &Payload::empty()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn suspending_callback_is_awaited() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut l = AsyncCallbackListener::new("awaits", move |p: Payload| {
            let tx = tx.clone();
            async move {
                tokio::task::yield_now().await;
                tx.send(*p.downcast_ref::<u8>().unwrap())?;
                Ok::<(), anyhow::Error>(())
            }
        });
        assert!(l.is_suspending());
        l.handle("e", &Payload::new(9u8)).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), 9);
    }

    #[tokio::test]
    async fn immediate_callback_completes() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let mut l = AsyncCallbackListener::immediate("sync", move |_p: Payload| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(!l.is_suspending());
        for _ in 0..3 {
            l.handle("e", &Payload::empty()).await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
