use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::result::StopResult;
use super::timers::IndicatorTimers;
use crate::device::{CameraDevice, Encoder};
use crate::error::RecordingError;
use crate::profile::{ResolvedProfile, Size};

/// Lifecycle phase, without the handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Previewing,
    Recording,
    Stopped,
    Cancelled,
    Error,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Stopped | SessionPhase::Cancelled | SessionPhase::Error
        )
    }
}

/// Session state carrying exactly the handles valid in that state.
///
/// The camera exists only in `Previewing` and `Recording`; the encoder only
/// in `Recording`. Terminal states hold no device handles.
pub(crate) enum SessionState {
    Idle,
    Previewing(Previewing),
    Recording(ActiveRecording),
    Stopped(StopResult),
    Cancelled,
    Failed(RecordingError),
}

impl SessionState {
    pub(crate) fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Previewing(_) => SessionPhase::Previewing,
            SessionState::Recording(_) => SessionPhase::Recording,
            SessionState::Stopped(_) => SessionPhase::Stopped,
            SessionState::Cancelled => SessionPhase::Cancelled,
            SessionState::Failed(_) => SessionPhase::Error,
        }
    }

    /// Preview buffer size of the open camera, if any
    pub(crate) fn preview_size(&self) -> Option<Size> {
        match self {
            SessionState::Previewing(p) => p.preview_size,
            SessionState::Recording(r) => r.preview_size,
            _ => None,
        }
    }
}

pub(crate) struct Previewing {
    pub camera: Box<dyn CameraDevice>,
    pub preview_size: Option<Size>,
}

pub(crate) struct ActiveRecording {
    pub camera: Box<dyn CameraDevice>,
    pub encoder: Box<dyn Encoder>,
    pub preview_size: Option<Size>,
    pub session_id: String,
    pub output_path: PathBuf,
    pub profile: ResolvedProfile,
    pub started_at: DateTime<Utc>,
    pub started_instant: Instant,
    pub timers: IndicatorTimers,
    /// Forwards encoder events into the session queue
    pub forwarder: JoinHandle<()>,
}

impl ActiveRecording {
    /// Stop every callback that could reference this recording.
    /// Runs before the encoder or camera is released.
    pub(crate) fn cancel_callbacks(&self) {
        self.timers.cancel();
        self.forwarder.abort();
    }
}
