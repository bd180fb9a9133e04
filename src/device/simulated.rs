// In-process camera and encoder
//
// Behaves like a handset camera stack without touching hardware:
// - cameras advertise preview sizes and a profile catalog
// - the encoder writes a small MP4-shaped file and honours max duration
// - faults can be injected at every step that can fail on a real device
// - a probe counts live handles so callers can check nothing leaks

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::backend::{
    CameraDevice, CameraParameters, CameraProvider, DeviceBackend, Encoder, EncoderConfig,
    EncoderEvent, EncoderFactory, FocusMode,
};
use crate::options::CameraFacing;
use crate::profile::{ProfileCatalog, Size};
use crate::surface::SurfaceHandle;

/// `ftyp` box so the output is recognisable as an MP4 container
const MP4_HEADER: [u8; 24] = [
    0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm', 0x00, 0x00, 0x02,
    0x00, b'i', b's', b'o', b'm', b'm', b'p', b'4', b'1',
];

/// Upper bound on synthetic payload written per recording
const MAX_PAYLOAD_BYTES: u64 = 256 * 1024;

/// Steps that can be made to fail
#[derive(Debug, Clone, Default)]
pub struct SimulatedFaults {
    /// Cameras that refuse to open
    pub fail_open: HashSet<CameraFacing>,
    pub fail_configure: bool,
    pub fail_start_preview: bool,
    pub fail_unlock: bool,
    pub fail_prepare: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
}

#[derive(Debug, Default)]
struct ProbeState {
    open_cameras: AtomicUsize,
    open_encoders: AtomicUsize,
    opened: Mutex<Vec<CameraFacing>>,
}

/// Live-handle counters shared between the backend and its observer
#[derive(Debug, Clone, Default)]
pub struct SimulatedProbe {
    state: Arc<ProbeState>,
}

impl SimulatedProbe {
    /// Cameras opened and not yet released
    pub fn open_cameras(&self) -> usize {
        self.state.open_cameras.load(Ordering::SeqCst)
    }

    /// Encoders created and not yet released
    pub fn open_encoders(&self) -> usize {
        self.state.open_encoders.load(Ordering::SeqCst)
    }

    /// Every successful camera open, in order
    pub fn opened_facings(&self) -> Vec<CameraFacing> {
        self.state
            .opened
            .lock()
            .map(|opened| opened.clone())
            .unwrap_or_default()
    }
}

/// Simulated camera provider and encoder factory
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    preview_sizes: Vec<Size>,
    profiles: ProfileCatalog,
    faults: Arc<Mutex<SimulatedFaults>>,
    probe: SimulatedProbe,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            preview_sizes: vec![
                Size::new(1920, 1080),
                Size::new(1440, 1080),
                Size::new(1280, 720),
                Size::new(960, 720),
                Size::new(640, 480),
                Size::new(320, 240),
            ],
            profiles: ProfileCatalog::standard(),
            faults: Arc::new(Mutex::new(SimulatedFaults::default())),
            probe: SimulatedProbe::default(),
        }
    }

    pub fn with_preview_sizes(mut self, sizes: Vec<Size>) -> Self {
        self.preview_sizes = sizes;
        self
    }

    pub fn with_profiles(mut self, profiles: ProfileCatalog) -> Self {
        self.profiles = profiles;
        self
    }

    /// Replace the injected faults; takes effect for the next device call
    pub fn set_faults(&self, faults: SimulatedFaults) {
        if let Ok(mut current) = self.faults.lock() {
            *current = faults;
        }
    }

    pub fn probe(&self) -> SimulatedProbe {
        self.probe.clone()
    }

    /// Camera and encoder backends backed by this simulation
    pub fn device_backend(&self) -> DeviceBackend {
        DeviceBackend::new(Arc::new(self.clone()), Arc::new(self.clone()))
    }

    fn faults(&self) -> SimulatedFaults {
        self.faults
            .lock()
            .map(|faults| faults.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CameraProvider for SimulatedBackend {
    async fn open(&self, facing: CameraFacing) -> Result<Box<dyn CameraDevice>> {
        if self.faults().fail_open.contains(&facing) {
            bail!("{} camera is unavailable", facing);
        }

        self.probe.state.open_cameras.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut opened) = self.probe.state.opened.lock() {
            opened.push(facing);
        }

        info!("Simulated {} camera opened", facing);

        Ok(Box::new(SimulatedCamera {
            facing,
            preview_sizes: self.preview_sizes.clone(),
            faults: Arc::clone(&self.faults),
            probe: self.probe.clone(),
            params: None,
            surface: None,
            locked: true,
            previewing: false,
            released: false,
        }))
    }

    fn supported_profiles(&self, _facing: CameraFacing) -> ProfileCatalog {
        self.profiles.clone()
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl EncoderFactory for SimulatedBackend {
    fn create(&self) -> Result<Box<dyn Encoder>> {
        self.probe.state.open_encoders.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SimulatedEncoder {
            faults: Arc::clone(&self.faults),
            probe: self.probe.clone(),
            config: None,
            file: None,
            started_at: None,
            timer: None,
            released: false,
        }))
    }
}

struct SimulatedCamera {
    facing: CameraFacing,
    preview_sizes: Vec<Size>,
    faults: Arc<Mutex<SimulatedFaults>>,
    probe: SimulatedProbe,
    params: Option<CameraParameters>,
    surface: Option<SurfaceHandle>,
    locked: bool,
    previewing: bool,
    released: bool,
}

impl SimulatedCamera {
    fn faults(&self) -> SimulatedFaults {
        self.faults
            .lock()
            .map(|faults| faults.clone())
            .unwrap_or_default()
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.released {
            bail!("{} camera has been released", self.facing);
        }
        if !self.locked {
            bail!("{} camera is controlled by an encoder", self.facing);
        }
        Ok(())
    }
}

impl CameraDevice for SimulatedCamera {
    fn facing(&self) -> CameraFacing {
        self.facing
    }

    fn supported_preview_sizes(&self) -> Vec<Size> {
        self.preview_sizes.clone()
    }

    fn supported_focus_modes(&self) -> Vec<FocusMode> {
        match self.facing {
            CameraFacing::Back => vec![FocusMode::ContinuousVideo, FocusMode::Auto],
            CameraFacing::Front => vec![FocusMode::Fixed],
        }
    }

    fn supports_stabilization(&self) -> bool {
        self.facing == CameraFacing::Back
    }

    fn configure(&mut self, params: &CameraParameters) -> Result<()> {
        self.ensure_usable()?;
        if self.faults().fail_configure {
            bail!("camera rejected parameters {:?}", params);
        }
        if let Some(size) = params.preview_size {
            if !self.preview_sizes.contains(&size) {
                bail!("unsupported preview size {}x{}", size.width, size.height);
            }
        }
        self.params = Some(params.clone());
        Ok(())
    }

    fn set_preview_surface(&mut self, surface: &SurfaceHandle) -> Result<()> {
        self.ensure_usable()?;
        self.surface = Some(surface.clone());
        Ok(())
    }

    fn start_preview(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.surface.is_none() {
            bail!("no preview surface attached");
        }
        if self.faults().fail_start_preview {
            bail!("preview stream failed to start");
        }
        self.previewing = true;
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.previewing = false;
    }

    fn is_previewing(&self) -> bool {
        self.previewing
    }

    fn unlock(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.faults().fail_unlock {
            bail!("camera could not be handed to the encoder");
        }
        self.locked = false;
        Ok(())
    }

    fn lock(&mut self) -> Result<()> {
        if self.released {
            bail!("{} camera has been released", self.facing);
        }
        self.locked = true;
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.previewing = false;
        self.probe.state.open_cameras.fetch_sub(1, Ordering::SeqCst);
        info!("Simulated {} camera released", self.facing);
    }
}

struct SimulatedEncoder {
    faults: Arc<Mutex<SimulatedFaults>>,
    probe: SimulatedProbe,
    config: Option<EncoderConfig>,
    file: Option<File>,
    started_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
    released: bool,
}

impl SimulatedEncoder {
    fn faults(&self) -> SimulatedFaults {
        self.faults
            .lock()
            .map(|faults| faults.clone())
            .unwrap_or_default()
    }

    fn output_path(&self) -> Option<PathBuf> {
        self.config.as_ref().map(|c| c.output_path.clone())
    }
}

#[async_trait::async_trait]
impl Encoder for SimulatedEncoder {
    async fn prepare(&mut self, camera: &mut dyn CameraDevice, config: &EncoderConfig) -> Result<()> {
        if self.released {
            bail!("encoder has been released");
        }
        if self.faults().fail_prepare {
            bail!("encoder prepare failed");
        }

        let mut file = File::create(&config.output_path)
            .with_context(|| format!("Failed to create output file: {:?}", config.output_path))?;
        file.write_all(&MP4_HEADER)
            .context("Failed to write container header")?;

        debug!(
            "Simulated encoder prepared: {:?} camera, {}x{}@{} -> {}",
            camera.facing(),
            config.profile.width,
            config.profile.height,
            config.profile.frame_rate,
            config.output_path.display()
        );

        self.file = Some(file);
        self.config = Some(config.clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<EncoderEvent>> {
        let Some(config) = self.config.clone() else {
            bail!("encoder started before prepare");
        };
        if self.faults().fail_start {
            bail!("encoder failed to start");
        }

        let (tx, rx) = mpsc::channel(4);

        if let Some(limit) = config.max_duration {
            self.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                let _ = tx.send(EncoderEvent::MaxDurationReached).await;
            }));
        }

        self.started_at = Some(Instant::now());
        info!("Simulated encoder writing {}", config.output_path.display());
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        let Some(started_at) = self.started_at.take() else {
            bail!("encoder is not running");
        };
        if self.faults().fail_stop {
            bail!("encoder failed to finalize {:?}", self.output_path());
        }

        let bitrate = self
            .config
            .as_ref()
            .map(|c| c.profile.video_bitrate as u64)
            .unwrap_or_default();
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        let payload = (bitrate / 8 * elapsed_ms / 1000).clamp(1, MAX_PAYLOAD_BYTES);

        if let Some(mut file) = self.file.take() {
            file.write_all(&vec![0u8; payload as usize])
                .context("Failed to write media payload")?;
            file.sync_all().context("Failed to flush recording")?;
        }

        debug!("Simulated encoder finalized after {}ms", elapsed_ms);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.file = None;
        self.started_at = None;

        if self.released {
            return;
        }
        self.released = true;
        self.probe.state.open_encoders.fetch_sub(1, Ordering::SeqCst);
        debug!("Simulated encoder released");
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
