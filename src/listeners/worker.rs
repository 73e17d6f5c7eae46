//! # Drain-and-dispatch loops.
//!
//! Two drivers share one dispatch policy:
//! - [`spawn_thread`]: a dedicated OS thread that drains, idles and sleeps one tick;
//! - [`run_task`]: a future for the cooperative loop that awaits the mailbox.
//!
//! ## Failure containment
//! Each handler call is wrapped in `catch_unwind`:
//! - `Ok(())` → `handled += 1`
//! - `Err(e)` → `failed += 1`, `warn!` with listener and event name
//! - panic    → `failed += 1`, `warn!` with the panic message
//!
//! The loop always continues with the next message.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave listener state inconsistent
//! if a handler panics halfway through a mutation.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::events::Message;
use crate::listeners::handle::Lifecycle;
use crate::listeners::{AsyncListener, Listener};
use crate::mailbox::Inbox;

/// Spawns the polling thread for a thread-domain listener.
pub(crate) fn spawn_thread<L: Listener>(
    listener: L,
    inbox: Inbox,
    lifecycle: Arc<Lifecycle>,
    tick: Duration,
) -> Result<JoinHandle<()>, BrokerError> {
    let name = thread_name(listener.name());
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || run_thread(listener, inbox, lifecycle, tick))
        .map_err(|source| BrokerError::Spawn { name, source })
}

fn run_thread<L: Listener>(
    mut listener: L,
    mut inbox: Inbox,
    lifecycle: Arc<Lifecycle>,
    tick: Duration,
) {
    if !lifecycle.mark_running() {
        return;
    }
    debug!(listener = listener.name(), "listener thread started");

    while !lifecycle.is_stop_requested() {
        // Stop is checked per message; queued messages behind a stop are discarded.
        while !lifecycle.is_stop_requested() {
            let Some(msg) = inbox.try_next() else {
                break;
            };
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| listener.handle(msg.event(), msg.payload())));
            record(listener.name(), &inbox, &msg, outcome);
        }
        if lifecycle.is_stop_requested() {
            break;
        }

        if let Err(panic_err) = panic::catch_unwind(AssertUnwindSafe(|| listener.idle())) {
            warn!(
                listener = listener.name(),
                panic = %panic_message(&*panic_err),
                "idle panicked"
            );
        }

        thread::sleep(tick);
    }

    lifecycle.stop();
    debug!(listener = listener.name(), "listener thread stopped");
}

/// Drives a cooperative listener until it is stopped or its mailbox closes.
pub(crate) async fn run_task<L: AsyncListener>(
    mut listener: L,
    mut inbox: Inbox,
    lifecycle: Arc<Lifecycle>,
) {
    if !lifecycle.mark_running() {
        return;
    }
    debug!(listener = listener.name(), "listener task started");

    loop {
        let msg = tokio::select! {
            biased;
            _ = lifecycle.cancelled() => break,
            next = inbox.next() => match next {
                Some(msg) => msg,
                None => break,
            },
        };

        let outcome = AssertUnwindSafe(listener.handle(msg.event(), msg.payload()))
            .catch_unwind()
            .await;
        record(listener.name(), &inbox, &msg, outcome);
    }

    lifecycle.stop();
    debug!(listener = listener.name(), "listener task stopped");
}

fn record(
    listener: &str,
    inbox: &Inbox,
    msg: &Message,
    outcome: Result<anyhow::Result<()>, Box<dyn Any + Send>>,
) {
    match outcome {
        Ok(Ok(())) => inbox.record_handled(),
        Ok(Err(err)) => {
            inbox.record_failed();
            warn!(listener, event = msg.event(), error = %err, "handler failed");
        }
        Err(panic_err) => {
            inbox.record_failed();
            warn!(
                listener,
                event = msg.event(),
                panic = %panic_message(&*panic_err),
                "handler panicked"
            );
        }
    }
}

fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn thread_name(listener: &str) -> String {
    let clean: String = listener.chars().filter(|c| *c != '\0').collect();
    format!("chatbus:{clean}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Payload;
    use crate::listeners::{Domain, ListenerHandle, ListenerState};
    use crate::mailbox;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(2);

    struct Flaky {
        out: mpsc::Sender<String>,
    }

    impl Listener for Flaky {
        fn handle(&mut self, event: &str, payload: &Payload) -> anyhow::Result<()> {
            let text = payload.downcast_ref::<&str>().copied().unwrap_or_default();
            match text {
                "err" => anyhow::bail!("rejected {event}"),
                "panic" => panic!("handler blew up"),
                other => {
                    self.out.send(other.to_string())?;
                    Ok(())
                }
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn start_flaky(cap: usize) -> (ListenerHandle, mpsc::Receiver<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let (mb, inbox) = mailbox::channel(cap).unwrap();
        let handle = ListenerHandle::new("flaky", Domain::Thread, mb);
        let join = spawn_thread(
            Flaky { out: tx },
            inbox,
            handle.lifecycle(),
            Duration::from_millis(1),
        )
        .unwrap();
        (handle, rx, join)
    }

    fn send(h: &ListenerHandle, text: &'static str) {
        h.enqueue(Message::new("say", Payload::new(text)));
    }

    #[test]
    fn failures_do_not_stop_the_thread() {
        let (h, rx, join) = start_flaky(8);
        send(&h, "err");
        send(&h, "panic");
        send(&h, "after");
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "after");

        let stats = h.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.handled, 1);
        assert_eq!(h.state(), ListenerState::Running);

        h.stop();
        join.join().unwrap();
        assert_eq!(h.state(), ListenerState::Stopped);
    }

    /// Blocks inside the handler for payload `1` until released.
    struct Parked {
        started: mpsc::Sender<u32>,
        release: mpsc::Receiver<()>,
        done: mpsc::Sender<u32>,
    }

    impl Listener for Parked {
        fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
            let n = *payload.downcast_ref::<u32>().unwrap_or(&0);
            self.started.send(n)?;
            if n == 1 {
                self.release.recv()?;
            }
            self.done.send(n)?;
            Ok(())
        }

        fn name(&self) -> &str {
            "parked"
        }
    }

    #[test]
    fn stop_mid_handler_completes_it_and_discards_the_backlog() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let (mb, inbox) = mailbox::channel(8).unwrap();
        let handle = ListenerHandle::new("parked", Domain::Thread, mb);
        let join = spawn_thread(
            Parked {
                started: started_tx,
                release: release_rx,
                done: done_tx,
            },
            inbox,
            handle.lifecycle(),
            Duration::from_millis(1),
        )
        .unwrap();

        handle.enqueue(Message::new("n", Payload::new(1u32)));
        assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), 1);
        handle.enqueue(Message::new("n", Payload::new(2u32)));
        handle.enqueue(Message::new("n", Payload::new(3u32)));
        assert_eq!(handle.pending(), 2);

        handle.stop();
        release_tx.send(()).unwrap();
        join.join().unwrap();

        let done: Vec<u32> = done_rx.try_iter().collect();
        assert_eq!(done, vec![1]);
        assert!(started_rx.try_recv().is_err());
        assert_eq!(handle.stats().handled, 1);
        assert_eq!(handle.state(), ListenerState::Stopped);
    }

    #[test]
    fn thread_exits_when_last_handle_dropped() {
        let (h, _rx, join) = start_flaky(1);
        drop(h);
        join.join().unwrap();
    }

    #[test]
    fn panic_messages_are_rendered() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(&*s), "static");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "unknown panic");
    }

    #[test]
    fn thread_names_are_sanitized() {
        assert_eq!(thread_name("mic\0rophone"), "chatbus:microphone");
    }

    struct Echo {
        out: tokio::sync::mpsc::UnboundedSender<u32>,
    }

    #[async_trait::async_trait]
    impl AsyncListener for Echo {
        async fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
            let n = *payload.downcast_ref::<u32>().unwrap();
            if n == 0 {
                panic!("zero");
            }
            tokio::task::yield_now().await;
            self.out.send(n)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn task_survives_panics_and_keeps_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (mb, inbox) = mailbox::channel(8).unwrap();
        let handle = ListenerHandle::new("echo", Domain::Cooperative, mb);
        let task = tokio::spawn(run_task(Echo { out: tx }, inbox, handle.lifecycle()));

        for n in [1u32, 0, 2, 3] {
            handle.enqueue(Message::new("n", Payload::new(n)));
        }
        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap());
        }
        assert_eq!(got, vec![1, 2, 3]);
        assert_eq!(handle.stats().failed, 1);

        handle.stop();
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(handle.state(), ListenerState::Stopped);
    }
}
