//! Recording session management
//!
//! A `RecordingSession` owns one recording attempt:
//! - Camera acquisition, configuration and live preview
//! - Handing the camera to the encoder and back
//! - Elapsed/blink indicator timers
//! - Exactly one terminal outcome (stopped, cancelled or failed)
//!
//! `SessionHandle` runs a session on its own task and is what callers share.

mod handle;
mod result;
mod session;
mod state;
mod timers;

pub use handle::{SessionHandle, WeakSessionHandle};
pub use result::{
    Completion, Indicator, Outcome, RecordingStarted, SessionStatus, StopResult, VIDEO_MIME_TYPE,
};
pub use session::RecordingSession;
pub use state::SessionPhase;
pub use timers::{SessionEvent, TickKind};
