use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::device::DeviceBackend;
use crate::error::{ErrorCode, RecorderResult, RecordingError};
use crate::options::{CameraFacing, RecordingOptions};
use crate::permissions::{Capability, PermissionService, PermissionState};
use crate::profile::ProfileLevel;
use crate::session::{
    Completion, RecordingSession, SessionHandle, SessionStatus, WeakSessionHandle, VIDEO_MIME_TYPE,
};
use crate::storage::{self, RecordingStorage};
use crate::surface::SurfaceHandle;

const AUDIO_MIME_TYPES: [&str; 3] = ["audio/mp4", "audio/wav", "audio/aac"];

/// A container and resolution the recorder can produce; audio modes carry
/// zero dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMode {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Entry point for hosts: owns the device backend and at most one live
/// recording session.
pub struct VideoRecorder {
    config: Config,
    backend: DeviceBackend,
    storage: RecordingStorage,
    permissions: Arc<dyn PermissionService>,
    /// Most recent session; replaced once it reaches a terminal phase.
    /// Weak, so the caller dropping its handles still tears it down.
    active: Arc<RwLock<Option<WeakSessionHandle>>>,
}

impl VideoRecorder {
    pub fn new(
        config: Config,
        backend: DeviceBackend,
        permissions: Arc<dyn PermissionService>,
    ) -> Self {
        let storage = RecordingStorage::from_config(&config.storage);

        info!(
            "{} using {} camera backend, recordings in {}",
            config.service.name,
            backend.cameras.name(),
            storage.videos_dir().display()
        );

        Self {
            config,
            backend,
            storage,
            permissions,
            active: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &RecordingStorage {
        &self.storage
    }

    /// Options from a loosely typed JSON payload, with missing keys taken
    /// from the configured defaults
    pub fn options_from_json(&self, payload: &str) -> RecorderResult<RecordingOptions> {
        let overrides: Value = serde_json::from_str(payload)
            .map_err(|e| RecordingError::invalid_options(format!("Malformed options: {}", e)))?;
        let Value::Object(overrides) = overrides else {
            return Err(RecordingError::invalid_options(
                "Options payload must be a JSON object",
            ));
        };

        let mut merged = serde_json::to_value(&self.config.defaults).map_err(|e| {
            RecordingError::new(
                ErrorCode::UnknownError,
                format!("Failed to encode default options: {}", e),
            )
        })?;
        if let Value::Object(base) = &mut merged {
            base.extend(overrides);
        }

        let options: RecordingOptions = serde_json::from_value(merged)
            .map_err(|e| RecordingError::invalid_options(format!("Invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Open a new session and start its preview.
    ///
    /// Fails with `AlreadyRecording` while the previous session is still
    /// live.
    pub async fn open_session(
        &self,
        options: RecordingOptions,
        surface: Option<SurfaceHandle>,
    ) -> RecorderResult<(SessionHandle, Completion)> {
        options.validate()?;
        self.check_permissions(&options)?;

        let mut active = self.active.write().await;
        if let Some(current) = active.as_ref() {
            if current.is_live() {
                warn!("Session requested while another is {:?}", current.phase());
                return Err(RecordingError::already_recording());
            }
        }

        let (session, completion) = RecordingSession::new(
            options,
            self.backend.clone(),
            self.storage.clone(),
            self.config.indicator.clone(),
        )?;
        let handle = SessionHandle::spawn(session);
        handle.open_preview(surface).await?;

        *active = Some(handle.downgrade());
        Ok((handle, completion))
    }

    /// Status of the current session, if one was opened and its caller
    /// still holds a handle
    pub async fn status(&self) -> RecorderResult<Option<SessionStatus>> {
        let handle = self
            .active
            .read()
            .await
            .as_ref()
            .and_then(WeakSessionHandle::upgrade);

        match handle {
            Some(handle) => Ok(Some(handle.status().await?)),
            None => Ok(None),
        }
    }

    /// Resolutions the `facing` camera records at, smallest first
    pub fn supported_video_modes(&self, facing: CameraFacing) -> Vec<VideoMode> {
        let catalog = self.backend.cameras.supported_profiles(facing);

        let mut modes: Vec<VideoMode> = catalog
            .iter()
            .filter(|(level, _)| *level >= ProfileLevel::P480)
            .map(|(_, profile)| VideoMode {
                mime_type: VIDEO_MIME_TYPE.to_string(),
                width: profile.width,
                height: profile.height,
            })
            .collect();

        modes.sort_by_key(|mode| u64::from(mode.width) * u64::from(mode.height));
        modes.dedup();
        modes
    }

    /// Audio containers the encoder can write
    pub fn supported_audio_modes(&self) -> Vec<VideoMode> {
        AUDIO_MIME_TYPES
            .iter()
            .map(|mime_type| VideoMode {
                mime_type: mime_type.to_string(),
                width: 0,
                height: 0,
            })
            .collect()
    }

    pub fn delete_recording(&self, video: &Path, delete_thumbnail: bool) -> RecorderResult<()> {
        storage::delete_recording(video, delete_thumbnail)
    }

    fn check_permissions(&self, options: &RecordingOptions) -> RecorderResult<()> {
        let mut needed = vec![Capability::Camera];
        if options.enable_audio {
            needed.push(Capability::Microphone);
        }

        for capability in needed {
            let state = self.permissions.check(capability);
            if state != PermissionState::Granted {
                warn!("{:?} permission is {:?}", capability, state);
                return Err(RecordingError::new(
                    ErrorCode::PermissionDenied,
                    format!("{:?} permission not granted", capability),
                ));
            }
        }

        Ok(())
    }
}
