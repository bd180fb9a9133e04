use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{ErrorCode, RecorderResult, RecordingError};

/// Container extension for every recording
pub const VIDEO_EXTENSION: &str = "mp4";

/// Where recordings live: `<root>/<videos_dir>/<prefix>_<millis>.mp4`
#[derive(Debug, Clone)]
pub struct RecordingStorage {
    root: PathBuf,
    videos_dir: String,
    /// Last timestamp handed out, so names stay distinct within one process
    last_stamp: Arc<AtomicI64>,
}

impl RecordingStorage {
    pub fn new(root: impl Into<PathBuf>, videos_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            videos_dir: videos_dir.into(),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Storage described by `config`, with a leading `~` in the root expanded
    pub fn from_config(config: &StorageConfig) -> Self {
        let root = shellexpand::tilde(&config.root.to_string_lossy()).into_owned();
        Self::new(root, config.videos_dir.clone())
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root.join(&self.videos_dir)
    }

    /// Create the recording directory if needed and pick a fresh output path
    pub fn prepare_output(&self, prefix: &str) -> Result<PathBuf> {
        let dir = self.videos_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create recording directory {:?}", dir))?;

        let mut stamp = self.next_stamp();
        loop {
            let path = dir.join(format!("{}_{}.{}", prefix, stamp, VIDEO_EXTENSION));
            if !path.exists() {
                debug!("Output path: {}", path.display());
                return Ok(path);
            }
            stamp = self.next_stamp();
        }
    }

    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_stamp.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Size of a finished recording in bytes
pub fn file_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read recording metadata: {:?}", path))?;
    Ok(metadata.len())
}

/// Remove a partially written recording. Failures are logged, never raised.
pub fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!("Deleted partial recording {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Partial recording {} was never written", path.display())
        }
        Err(e) => warn!("Failed to delete partial recording {}: {}", path.display(), e),
    }
}

/// Thumbnail written next to a recording by the extraction service
pub fn thumbnail_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    video.with_file_name(format!("{}_thumbnail.jpg", stem))
}

/// Delete a recording and optionally its thumbnail.
///
/// A recording that is already gone is not an error.
pub fn delete_recording(video: &Path, delete_thumbnail: bool) -> RecorderResult<()> {
    if video.as_os_str().is_empty() {
        return Err(RecordingError::invalid_options("videoPath must not be empty"));
    }

    remove_if_present(video).map_err(|e| {
        RecordingError::from_platform(ErrorCode::StorageError, "Failed to delete video file", &e)
    })?;

    if delete_thumbnail {
        let thumbnail = thumbnail_path(video);
        if let Err(e) = remove_if_present(&thumbnail) {
            warn!("Failed to delete thumbnail {}: {:#}", thumbnail.display(), e);
        }
    }

    info!("Deleted recording {}", video.display());
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
    }
}
