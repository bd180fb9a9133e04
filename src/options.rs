use crate::error::{RecorderResult, RecordingError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Quality tier requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
    Highest,
}

/// Which physical camera to record from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    pub fn opposite(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

/// Orientation hint for the hosting UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Rotation applied to camera frames for display, in degrees.
    /// Sensors are mounted landscape, so portrait needs a quarter turn.
    pub fn display_rotation(self) -> u32 {
        match self {
            Orientation::Portrait => 90,
            Orientation::Landscape => 0,
        }
    }
}

/// Immutable input for a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingOptions {
    /// Quality tier (default: high)
    pub quality: Quality,

    /// Hard stop after this many seconds; 0 means unbounded
    /// Default: 300 seconds (5 minutes)
    #[serde(alias = "max_duration")]
    pub max_duration: f64,

    /// Output filename prefix (default: "video_recording")
    #[serde(alias = "file_name_prefix")]
    pub file_name_prefix: String,

    /// Initial camera (default: back)
    pub camera: CameraFacing,

    /// Orientation hint (default: portrait)
    pub orientation: Orientation,

    /// Whether the encoder records an audio track (default: true)
    #[serde(alias = "enable_audio")]
    pub enable_audio: bool,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            quality: Quality::High,
            max_duration: 300.0,
            file_name_prefix: "video_recording".to_string(),
            camera: CameraFacing::Back,
            orientation: Orientation::Portrait,
            enable_audio: true,
        }
    }
}

impl RecordingOptions {
    /// Parse options from the loosely typed JSON payload handed over by a
    /// dispatch layer. Missing keys take their defaults.
    pub fn from_json(payload: &str) -> RecorderResult<Self> {
        let options: Self = serde_json::from_str(payload)
            .map_err(|e| RecordingError::invalid_options(format!("Malformed options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> RecorderResult<()> {
        if self.max_duration < 0.0 || Duration::try_from_secs_f64(self.max_duration).is_err() {
            return Err(RecordingError::invalid_options(format!(
                "maxDuration must be a representable non-negative number of seconds, got {}",
                self.max_duration
            )));
        }

        if self.file_name_prefix.trim().is_empty() {
            return Err(RecordingError::invalid_options(
                "fileNamePrefix must not be empty",
            ));
        }

        if self
            .file_name_prefix
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0'))
        {
            return Err(RecordingError::invalid_options(format!(
                "fileNamePrefix contains a path separator: {:?}",
                self.file_name_prefix
            )));
        }

        Ok(())
    }

    /// Configured ceiling, or `None` when recording is unbounded.
    /// Values no `Duration` can hold never get past `validate`.
    pub fn max_duration(&self) -> Option<Duration> {
        if self.max_duration > 0.0 {
            Duration::try_from_secs_f64(self.max_duration).ok()
        } else {
            None
        }
    }
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = RecordingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(RecordingError::invalid_options(format!(
                        "Unknown {} value: {:?}",
                        stringify!($ty).to_ascii_lowercase(),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(Quality {
    Low => "low",
    Medium => "medium",
    High => "high",
    Highest => "highest",
});

string_enum!(CameraFacing {
    Front => "front",
    Back => "back",
});

string_enum!(Orientation {
    Portrait => "portrait",
    Landscape => "landscape",
});
