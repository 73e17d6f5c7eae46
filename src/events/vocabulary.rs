//! # Event vocabulary shared by the companion's subsystems.
//!
//! Event names are plain strings; this module pins down the ones the recognizer,
//! dialog manager, player and windows exchange, together with the payload type
//! each carries. Signal-only events carry [`Payload::empty`](crate::Payload::empty).
//!
//! ```text
//! recognizer ── CHAT_USER_INPUT(UserUtterance) ──► dialog manager
//!            └─ CHAT_CYCLE_TIME(CycleTiming)  ──►
//! dialog     ── CHAT_RESPONSE(ChatResponse)   ──► player, chat window
//! player     ── CHAT_DONE / CHAT_LISTENING_START ──► recognizer, chat window
//! any        ── log_event(tag)(LogLine)       ──► log window
//! ```

use std::time::SystemTime;

/// The recognizer opened the microphone for a new user turn.
pub const CHAT_LISTENING_START: &str = "chat_listening_start";
/// The companion itself started listening (wake-word mode).
pub const COMPANION_LISTENING_START: &str = "companion_listening_start";
/// A finished user utterance; payload [`UserUtterance`].
pub const CHAT_USER_INPUT: &str = "chat_user_input";
/// Timing of a completed input cycle; payload [`CycleTiming`].
pub const CHAT_CYCLE_TIME: &str = "chat_cycle_time";
/// A response is ready to render or play; payload [`ChatResponse`].
pub const CHAT_RESPONSE: &str = "chat_response";
/// The current exchange is over.
pub const CHAT_DONE: &str = "chat_done";
/// The recognizer stopped listening for this turn.
pub const CHAT_DONE_LISTENING: &str = "chat_done_listening";
/// The wake word was heard.
pub const WAKE_UP: &str = "wake_up";
/// Ask the player to finish the current response before continuing.
pub const WAIT_CHAT_FINISH: &str = "wait_chat_finish";
/// Playback of a response finished.
pub const PLAY_RESPONSE_END: &str = "play_response_end";

/// Prefix of per-component log events, see [`log_event`].
pub const LOG_PREFIX: &str = "log ";

/// Event name carrying log lines for the component tagged `tag`.
///
/// ```rust
/// assert_eq!(chatbus::vocabulary::log_event("mic"), "log mic");
/// ```
pub fn log_event(tag: &str) -> String {
    format!("{LOG_PREFIX}{tag}")
}

/// Returns the component tag if `event` is a log event.
pub fn log_tag(event: &str) -> Option<&str> {
    event.strip_prefix(LOG_PREFIX)
}

/// A transcript of what the user said, with capture timing.
#[derive(Clone, Debug, PartialEq)]
pub struct UserUtterance {
    /// Recognized or typed text.
    pub content: String,
    /// When capture started.
    pub start_time: SystemTime,
    /// When capture ended.
    pub end_time: SystemTime,
}

/// Timing of one input cycle, tagged with how the input arrived.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleTiming {
    /// Input mode label, e.g. `"WHISPER MODE"` or `"KEYBOARD MODE"`.
    pub mode: String,
    /// Cycle start.
    pub start_time: SystemTime,
    /// Cycle end.
    pub end_time: SystemTime,
}

/// How a [`ChatResponse`] should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    /// `msg` is text to display and synthesize.
    Text,
    /// `msg` is a reference to a rendered media file.
    Video,
}

/// A response produced by the dialog manager.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatResponse {
    /// Rendered text or media reference, depending on `kind`.
    pub msg: String,
    /// Presentation hint.
    pub kind: ResponseKind,
    /// Emotion label attached by the classifier.
    pub emotion: String,
}

impl ChatResponse {
    /// A text response.
    pub fn text(msg: impl Into<String>, emotion: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            kind: ResponseKind::Text,
            emotion: emotion.into(),
        }
    }
}

/// One line published through [`crate::Loggable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// Component tag.
    pub tag: String,
    /// Rendered text.
    pub line: String,
}
