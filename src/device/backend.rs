use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::options::CameraFacing;
use crate::profile::{ProfileCatalog, Size, VideoProfile};
use crate::surface::SurfaceHandle;

/// Focus modes a camera may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusMode {
    ContinuousVideo,
    Auto,
    Fixed,
}

/// Parameters applied to a camera right after it is opened
#[derive(Debug, Clone, PartialEq)]
pub struct CameraParameters {
    /// Preview buffer size (None = device default)
    pub preview_size: Option<Size>,
    /// Rotation applied to frames for display, in degrees
    pub display_rotation: u32,
    /// Focus mode, if the device offers a suitable one
    pub focus_mode: Option<FocusMode>,
    /// Enable video stabilisation
    pub stabilization: bool,
}

/// Camera access backend
///
/// Platform-specific implementations open a physical camera by facing.
/// The simulated backend stands in for tests and the CLI.
#[async_trait::async_trait]
pub trait CameraProvider: Send + Sync {
    /// Open the camera facing `facing` for exclusive use
    async fn open(&self, facing: CameraFacing) -> Result<Box<dyn CameraDevice>>;

    /// Recording profiles the camera facing `facing` supports
    fn supported_profiles(&self, facing: CameraFacing) -> ProfileCatalog;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// An open camera device
///
/// While unlocked the device is driven by an encoder instead of the preview
/// pipeline; `lock` hands control back.
pub trait CameraDevice: Send {
    fn facing(&self) -> CameraFacing;

    fn supported_preview_sizes(&self) -> Vec<Size>;

    fn supported_focus_modes(&self) -> Vec<FocusMode>;

    fn supports_stabilization(&self) -> bool;

    fn configure(&mut self, params: &CameraParameters) -> Result<()>;

    fn set_preview_surface(&mut self, surface: &SurfaceHandle) -> Result<()>;

    fn start_preview(&mut self) -> Result<()>;

    fn stop_preview(&mut self);

    fn is_previewing(&self) -> bool;

    /// Release direct control so an encoder can drive the device
    fn unlock(&mut self) -> Result<()>;

    /// Reclaim control from an encoder
    fn lock(&mut self) -> Result<()>;

    /// Release the device. Must be idempotent.
    fn release(&mut self);
}

/// Settings handed to the encoder before it starts writing
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// MP4 file the encoder writes
    pub output_path: PathBuf,
    pub profile: VideoProfile,
    pub enable_audio: bool,
    /// Encoder reports `MaxDurationReached` once this much has been recorded
    pub max_duration: Option<Duration>,
    /// Orientation hint stored in the container, in degrees
    pub orientation_hint: u32,
    /// Surface the encoder keeps rendering the preview into
    pub preview_surface: Option<SurfaceHandle>,
}

/// Asynchronous notifications from a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// The configured duration ceiling was reached
    MaxDurationReached,
    /// The encoder hit an unrecoverable fault while writing
    Error(String),
}

/// Hardware media encoder session
#[async_trait::async_trait]
pub trait Encoder: Send {
    /// Take over `camera` (already unlocked) and get ready to write
    async fn prepare(&mut self, camera: &mut dyn CameraDevice, config: &EncoderConfig) -> Result<()>;

    /// Start writing
    ///
    /// Returns a channel receiver for encoder events
    async fn start(&mut self) -> Result<mpsc::Receiver<EncoderEvent>>;

    /// Stop writing and finalize the container
    async fn stop(&mut self) -> Result<()>;

    /// Release the encoder. Must be idempotent.
    fn release(&mut self);

    /// Get encoder name for logging
    fn name(&self) -> &str;
}

/// Creates encoder sessions
pub trait EncoderFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Encoder>>;
}

/// Camera and encoder backends a session drives
#[derive(Clone)]
pub struct DeviceBackend {
    pub cameras: Arc<dyn CameraProvider>,
    pub encoders: Arc<dyn EncoderFactory>,
}

impl DeviceBackend {
    pub fn new(cameras: Arc<dyn CameraProvider>, encoders: Arc<dyn EncoderFactory>) -> Self {
        Self { cameras, encoders }
    }
}
