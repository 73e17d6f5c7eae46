//! Three simulated turns across both domains.
//!
//! ```text
//! recognizer thread ─ CHAT_USER_INPUT ─► [coop] dialog ─ CHAT_RESPONSE ─► [sync] player
//!        │                                                                   │
//!        └─ log recognizer ─► [sync] ─ relay ─► [coop] log window ◄─ relay ─ log player
//!                                                                            │
//! main ◄─────────────────────────── CHAT_DONE [coop] ◄───────────────────────┘
//! ```
//!
//! Run with `RUST_LOG=chatbus=debug CHATBUS_VERBOSE=1` to see subscriptions and drops.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chatbus::vocabulary::{
    self, CHAT_DONE, CHAT_RESPONSE, CHAT_USER_INPUT, ChatResponse, LogLine, UserUtterance,
};
use chatbus::{
    AsyncListener, BrokerConfig, CoopBroker, Listener, Loggable, Logger, Payload, SyncBroker,
};
use tracing_subscriber::EnvFilter;

const UTTERANCES: [&str; 3] = ["hello there", "what's the weather", "goodbye"];

/// Cooperative stand-in for the language model.
struct Dialog {
    replies_to: SyncBroker,
    turns: usize,
}

#[async_trait]
impl AsyncListener for Dialog {
    async fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
        let utterance = payload
            .downcast_ref::<UserUtterance>()
            .ok_or_else(|| anyhow::anyhow!("expected UserUtterance, got {}", payload.type_name()))?;

        tokio::time::sleep(Duration::from_millis(30)).await;
        self.turns += 1;
        let reply = format!("(turn {}) you said: {}", self.turns, utterance.content);
        self.replies_to
            .emit(CHAT_RESPONSE, Payload::new(ChatResponse::text(reply, "neutral")));
        Ok(())
    }

    fn name(&self) -> &str {
        "dialog"
    }
}

/// Thread-domain stand-in for audio playback.
struct Player {
    logger: Logger,
    done_to: CoopBroker,
}

impl Loggable for Player {
    fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl Listener for Player {
    fn handle(&mut self, _event: &str, payload: &Payload) -> anyhow::Result<()> {
        if let Some(resp) = payload.downcast_ref::<ChatResponse>() {
            self.log(format_args!("playing [{}] {}", resp.emotion, resp.msg));
            thread::sleep(Duration::from_millis(20));
        }
        self.done_to.emit_signal(CHAT_DONE);
        Ok(())
    }

    fn name(&self) -> &str {
        "player"
    }
}

struct Recognizer {
    logger: Logger,
}

impl Loggable for Recognizer {
    fn logger(&self) -> &Logger {
        &self.logger
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatbus=info")),
        )
        .init();

    let sync = SyncBroker::new(BrokerConfig::from_env());
    let coop = CoopBroker::start(BrokerConfig::from_env())?;

    // Log window on the loop, fed from the thread domain.
    coop.subscribe_immediate_fn(&vocabulary::log_event("recognizer"), print_log_line)?;
    coop.subscribe_immediate_fn(&vocabulary::log_event("player"), print_log_line)?;
    let relay = coop.relay_from(&sync, &vocabulary::log_event("recognizer"))?;
    sync.attach(&vocabulary::log_event("player"), &relay)?;

    coop.subscribe(
        CHAT_USER_INPUT,
        Dialog {
            replies_to: sync.clone(),
            turns: 0,
        },
    )?;
    sync.subscribe(
        CHAT_RESPONSE,
        Player {
            logger: Logger::new("player", sync.clone()),
            done_to: coop.clone(),
        },
    )?;

    let (done_tx, done_rx) = mpsc::channel();
    coop.subscribe_immediate_fn(CHAT_DONE, move |_p: Payload| {
        done_tx.send(())?;
        Ok(())
    })?;

    let recognizer = Recognizer {
        logger: Logger::new("recognizer", sync.clone()),
    };
    let input = coop.clone();
    let mic = thread::Builder::new()
        .name("recognizer".into())
        .spawn(move || {
            for text in UTTERANCES {
                let start_time = SystemTime::now();
                thread::sleep(Duration::from_millis(40));
                recognizer.log(format_args!("heard {text:?}"));
                input.emit(
                    CHAT_USER_INPUT,
                    Payload::new(UserUtterance {
                        content: text.to_string(),
                        start_time,
                        end_time: SystemTime::now(),
                    }),
                );
            }
        })?;

    for _ in UTTERANCES {
        done_rx.recv_timeout(Duration::from_secs(5))?;
    }
    mic.join()
        .map_err(|_| anyhow::anyhow!("recognizer thread panicked"))?;

    tracing::info!(sync = ?sync.stats(), coop = ?coop.stats(), "conversation finished");
    Ok(())
}

fn print_log_line(payload: Payload) -> anyhow::Result<()> {
    if let Some(LogLine { tag, line }) = payload.downcast_ref::<LogLine>() {
        println!("[{tag}] {line}");
    }
    Ok(())
}
