use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::oneshot;

use super::state::SessionPhase;
use crate::error::{RecorderResult, RecordingError};
use crate::options::CameraFacing;

/// MIME type of every recording
pub const VIDEO_MIME_TYPE: &str = "video/mp4";

/// Result of a successfully stopped recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    /// Session identifier generated at start
    pub recording_id: String,

    /// Path of the finished MP4 file
    pub video_path: PathBuf,

    /// File size in bytes
    pub file_size: u64,

    /// Recorded duration in seconds
    pub duration: f64,

    /// Resolved video width
    pub width: u32,

    /// Resolved video height
    pub height: u32,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    pub mime_type: String,
}

/// Terminal signal of a session; exactly one is delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "lowercase")]
pub enum Outcome {
    Completed(StopResult),
    Cancelled,
    Failed(RecordingError),
}

impl Outcome {
    /// Flatten into a result; cancellation becomes `UserCancelled`
    pub fn into_result(self) -> RecorderResult<StopResult> {
        match self {
            Outcome::Completed(result) => Ok(result),
            Outcome::Cancelled => Err(RecordingError::user_cancelled()),
            Outcome::Failed(err) => Err(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// Returned when the encoder starts writing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStarted {
    pub recording_id: String,
    pub start_time: DateTime<Utc>,
    pub video_path: PathBuf,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub is_recording: bool,
    /// Seconds recorded so far, or the final duration once stopped
    pub current_duration: f64,
    pub recording_id: Option<String>,
    pub video_path: Option<PathBuf>,
    pub camera: CameraFacing,
    /// Why the session ended in `Error`
    pub last_error: Option<RecordingError>,
}

/// Readout driven by the elapsed and blink timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub phase: SessionPhase,
    pub elapsed_secs: u64,
    pub blink_visible: bool,
}

impl Indicator {
    pub fn new(phase: SessionPhase) -> Self {
        Self {
            phase,
            elapsed_secs: 0,
            blink_visible: false,
        }
    }

    /// Elapsed time as `MM:SS`
    pub fn label(&self) -> String {
        format!("{:02}:{:02}", self.elapsed_secs / 60, self.elapsed_secs % 60)
    }
}

/// Resolves to the session's terminal signal
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Outcome>,
}

impl Completion {
    pub(crate) fn new(rx: oneshot::Receiver<Outcome>) -> Self {
        Self { rx }
    }

    /// Wait for the terminal signal
    pub async fn wait(self) -> Outcome {
        self.rx
            .await
            .unwrap_or_else(|_| Outcome::Failed(RecordingError::session_gone()))
    }

    /// Terminal signal if it has already been produced
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }
}
