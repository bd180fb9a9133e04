use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed set of error codes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    AlreadyRecording,
    NotRecording,
    InvalidOptions,
    CameraError,
    RecordingFailed,
    StorageError,
    FileNotFound,
    UserCancelled,
    UnknownError,
}

impl ErrorCode {
    /// Wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::AlreadyRecording => "ALREADY_RECORDING",
            ErrorCode::NotRecording => "NOT_RECORDING",
            ErrorCode::InvalidOptions => "INVALID_OPTIONS",
            ErrorCode::CameraError => "CAMERA_ERROR",
            ErrorCode::RecordingFailed => "RECORDING_FAILED",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::UserCancelled => "USER_CANCELLED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced to the caller: a code plus a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RecordingError {
    pub code: ErrorCode,
    pub message: String,
}

/// Result type for every caller-facing operation
pub type RecorderResult<T> = Result<T, RecordingError>;

impl RecordingError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Map a platform fault into the taxonomy, keeping the whole context chain
    pub fn from_platform(code: ErrorCode, context: &str, err: &anyhow::Error) -> Self {
        Self::new(code, format!("{}: {:#}", context, err))
    }

    pub fn already_recording() -> Self {
        Self::new(ErrorCode::AlreadyRecording, "Recording is already in progress")
    }

    pub fn not_recording() -> Self {
        Self::new(ErrorCode::NotRecording, "No active recording to stop")
    }

    pub fn user_cancelled() -> Self {
        Self::new(ErrorCode::UserCancelled, "Recording was cancelled")
    }

    pub fn invalid_options(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOptions, message)
    }

    pub fn session_gone() -> Self {
        Self::new(
            ErrorCode::UnknownError,
            "Recording session ended without a response",
        )
    }
}
