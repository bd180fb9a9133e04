use anyhow::{Context, Result};
use chrono::Utc;
use std::mem;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::result::{
    Completion, Indicator, Outcome, RecordingStarted, SessionStatus, StopResult, VIDEO_MIME_TYPE,
};
use super::state::{ActiveRecording, Previewing, SessionPhase, SessionState};
use super::timers::{forward_encoder_events, IndicatorTimers, SessionEvent, TickKind};
use crate::config::IndicatorConfig;
use crate::device::{
    CameraDevice, CameraParameters, DeviceBackend, Encoder, EncoderConfig, EncoderEvent, FocusMode,
};
use crate::error::{ErrorCode, RecorderResult, RecordingError};
use crate::options::{CameraFacing, RecordingOptions};
use crate::profile::{resolve_profile, select_preview_size, ResolvedProfile, Size};
use crate::storage::{self, RecordingStorage};
use crate::surface::{PreviewLayout, SurfaceBinding, SurfaceHandle};

/// One recording attempt: owns the camera and encoder and drives them
/// through `Idle → Previewing → Recording → {Stopped | Cancelled | Error}`.
///
/// All methods take `&mut self`; callers that need to share a session go
/// through [`super::SessionHandle`], which serializes every call onto a
/// single worker task.
pub struct RecordingSession {
    options: RecordingOptions,

    backend: DeviceBackend,

    storage: RecordingStorage,

    indicator_config: IndicatorConfig,

    state: SessionState,

    /// Camera to use for the next open
    facing: CameraFacing,

    surface: SurfaceBinding,

    /// Bumped on every entry to and exit from `Recording`
    generation: u64,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    indicator: watch::Sender<Indicator>,

    /// Taken when the terminal signal is delivered
    completion: Option<oneshot::Sender<Outcome>>,
}

impl RecordingSession {
    /// Create a session in `Idle`
    pub fn new(
        options: RecordingOptions,
        backend: DeviceBackend,
        storage: RecordingStorage,
        indicator_config: IndicatorConfig,
    ) -> RecorderResult<(Self, Completion)> {
        options.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        let (indicator, _) = watch::channel(Indicator::new(SessionPhase::Idle));

        info!(
            "Creating recording session ({} quality, {} camera)",
            options.quality, options.camera
        );

        let session = Self {
            facing: options.camera,
            options,
            backend,
            storage,
            indicator_config,
            state: SessionState::Idle,
            surface: SurfaceBinding::new(),
            generation: 0,
            events_tx,
            events_rx,
            indicator,
            completion: Some(completion_tx),
        };

        Ok((session, Completion::new(completion_rx)))
    }

    pub fn options(&self) -> &RecordingOptions {
        &self.options
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Camera currently open, or the one the next open will use
    pub fn camera_facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn indicator(&self) -> watch::Receiver<Indicator> {
        self.indicator.subscribe()
    }

    pub fn layout(&self) -> Option<PreviewLayout> {
        self.surface.layout()
    }

    pub fn status(&self) -> SessionStatus {
        let (recording_id, video_path, current_duration) = match &self.state {
            SessionState::Recording(active) => (
                Some(active.session_id.clone()),
                Some(active.output_path.clone()),
                active.started_instant.elapsed().as_secs_f64(),
            ),
            SessionState::Stopped(result) => (
                Some(result.recording_id.clone()),
                Some(result.video_path.clone()),
                result.duration,
            ),
            _ => (None, None, 0.0),
        };

        let last_error = match &self.state {
            SessionState::Failed(err) => Some(err.clone()),
            _ => None,
        };

        SessionStatus {
            phase: self.phase(),
            is_recording: self.phase() == SessionPhase::Recording,
            current_duration,
            recording_id,
            video_path,
            camera: self.facing,
            last_error,
        }
    }

    // ------------------------------------------------------------------
    // Preview
    // ------------------------------------------------------------------

    /// Open the camera and start the live preview on `surface` (or on the
    /// surface that becomes ready later).
    pub async fn open_preview(&mut self, surface: Option<SurfaceHandle>) -> RecorderResult<()> {
        match self.phase() {
            SessionPhase::Idle => {}
            SessionPhase::Previewing => {
                debug!("Preview already open");
                return Ok(());
            }
            SessionPhase::Recording => return Err(RecordingError::already_recording()),
            _ => return Err(session_finished()),
        }

        if let Some(surface) = surface {
            // No camera yet, so this only records the surface
            let _ = self.surface.surface_ready(surface, None);
        }

        match self.open_camera(self.facing).await {
            Ok(previewing) => {
                info!("Preview open on {} camera", self.facing);
                self.state = SessionState::Previewing(previewing);
                self.publish_phase();
                Ok(())
            }
            Err(e) => {
                let err = RecordingError::from_platform(
                    ErrorCode::CameraError,
                    "Failed to open camera",
                    &e,
                );
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Switch to the opposite camera. Ignored while recording.
    ///
    /// The reopen is atomic: if the opposite camera cannot be opened the
    /// previous one is reopened and the session stays in `Previewing`; if
    /// that also fails the session ends in `Error`.
    pub async fn switch_camera(&mut self) -> RecorderResult<()> {
        match self.phase() {
            SessionPhase::Previewing => {}
            SessionPhase::Recording => {
                info!("Camera switch ignored while recording");
                return Ok(());
            }
            SessionPhase::Idle => {
                self.facing = self.facing.opposite();
                debug!("Camera preference switched to {} before preview", self.facing);
                return Ok(());
            }
            _ => return Err(session_finished()),
        }

        let SessionState::Previewing(mut current) = mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Err(session_finished());
        };

        let previous = current.camera.facing();
        let target = previous.opposite();
        current.camera.stop_preview();
        current.camera.release();
        drop(current);

        info!("Switching camera: {} -> {}", previous, target);

        match self.open_camera(target).await {
            Ok(previewing) => {
                self.facing = target;
                self.state = SessionState::Previewing(previewing);
                Ok(())
            }
            Err(e) => {
                let err = RecordingError::from_platform(
                    ErrorCode::CameraError,
                    &format!("Failed to switch to {} camera", target),
                    &e,
                );
                warn!("{}; restoring {} camera", err.message, previous);

                match self.open_camera(previous).await {
                    Ok(previewing) => {
                        self.state = SessionState::Previewing(previewing);
                        Err(err)
                    }
                    Err(restore) => {
                        error!("Failed to restore {} camera: {:#}", previous, restore);
                        let err = RecordingError::from_platform(
                            ErrorCode::CameraError,
                            &format!("{}; restoring the {} camera also failed", err.message, previous),
                            &restore,
                        );
                        self.fail(err.clone());
                        Err(err)
                    }
                }
            }
        }
    }

    async fn open_camera(&mut self, facing: CameraFacing) -> Result<Previewing> {
        let mut camera = self
            .backend
            .cameras
            .open(facing)
            .await
            .with_context(|| format!("{} camera could not be opened", facing))?;

        match self.configure_camera(camera.as_mut()) {
            Ok(preview_size) => Ok(Previewing {
                camera,
                preview_size,
            }),
            Err(e) => {
                camera.stop_preview();
                camera.release();
                Err(e)
            }
        }
    }

    fn configure_camera(&mut self, camera: &mut dyn CameraDevice) -> Result<Option<Size>> {
        let catalog = self.backend.cameras.supported_profiles(camera.facing());
        let target = resolve_profile(self.options.quality, &catalog)?;
        let preview_size = select_preview_size(&camera.supported_preview_sizes(), target.profile.size());

        let focus_modes = camera.supported_focus_modes();
        let focus_mode = [FocusMode::ContinuousVideo, FocusMode::Auto]
            .into_iter()
            .find(|mode| focus_modes.contains(mode));

        let params = CameraParameters {
            preview_size,
            display_rotation: self.options.orientation.display_rotation(),
            focus_mode,
            stabilization: camera.supports_stabilization(),
        };
        camera
            .configure(&params)
            .context("Camera rejected parameters")?;

        if let Some(size) = preview_size {
            debug!(
                "Preview size {}x{} for {}x{} target",
                size.width, size.height, target.profile.width, target.profile.height
            );
        }

        self.surface.bind(camera)?;
        self.surface
            .relayout(preview_size, self.options.orientation.display_rotation());

        Ok(preview_size)
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Hand the camera to a freshly prepared encoder and start writing
    pub async fn start(&mut self) -> RecorderResult<RecordingStarted> {
        match self.phase() {
            SessionPhase::Previewing => {}
            SessionPhase::Recording => return Err(RecordingError::already_recording()),
            SessionPhase::Idle => {
                return Err(RecordingError::new(
                    ErrorCode::CameraError,
                    "Camera preview is not open",
                ))
            }
            _ => return Err(session_finished()),
        }

        let SessionState::Previewing(previewing) = mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Err(session_finished());
        };

        match self.begin_recording(previewing).await {
            Ok(active) => {
                let started = RecordingStarted {
                    recording_id: active.session_id.clone(),
                    start_time: active.started_at,
                    video_path: active.output_path.clone(),
                };

                info!(
                    "Recording {} started: {}x{} @ {} bps -> {}",
                    started.recording_id,
                    active.profile.profile.width,
                    active.profile.profile.height,
                    active.profile.profile.video_bitrate,
                    started.video_path.display()
                );

                self.state = SessionState::Recording(active);
                self.indicator.send_replace(Indicator {
                    phase: SessionPhase::Recording,
                    elapsed_secs: 0,
                    blink_visible: true,
                });
                Ok(started)
            }
            Err(err) => {
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Acquire the encoder for `previewing`. On failure every handle acquired
    /// here and the camera itself have been released.
    async fn begin_recording(&mut self, previewing: Previewing) -> RecorderResult<ActiveRecording> {
        let Previewing {
            mut camera,
            preview_size,
        } = previewing;

        let (profile, encoder, output_path, encoder_rx) =
            match self.acquire_encoder(camera.as_mut()).await {
                Ok(acquired) => acquired,
                Err(e) => {
                    error!("Failed to start recording: {:#}", e);
                    return Err(RecordingError::from_platform(
                        ErrorCode::RecordingFailed,
                        "Failed to start recording",
                        &e,
                    ));
                }
            };

        self.generation += 1;
        let started_at = Utc::now();

        Ok(ActiveRecording {
            camera,
            encoder,
            preview_size,
            session_id: recording_id(started_at.timestamp_millis()),
            output_path,
            profile,
            started_at,
            started_instant: Instant::now(),
            timers: IndicatorTimers::arm(self.generation, &self.indicator_config, &self.events_tx),
            forwarder: forward_encoder_events(self.generation, encoder_rx, self.events_tx.clone()),
        })
    }

    async fn acquire_encoder(
        &mut self,
        camera: &mut dyn CameraDevice,
    ) -> Result<(
        ResolvedProfile,
        Box<dyn Encoder>,
        PathBuf,
        mpsc::Receiver<EncoderEvent>,
    )> {
        let mut rollback = StartRollback::new(camera);

        let catalog = self
            .backend
            .cameras
            .supported_profiles(rollback.camera.facing());
        let profile = resolve_profile(self.options.quality, &catalog)?;

        let output_path = self
            .storage
            .prepare_output(&self.options.file_name_prefix)?;
        rollback.output = Some(output_path.clone());

        rollback
            .camera
            .unlock()
            .context("Failed to hand camera to the encoder")?;
        rollback.unlocked = true;

        let mut encoder = self
            .backend
            .encoders
            .create()
            .context("Failed to create encoder")?;

        let config = EncoderConfig {
            output_path: output_path.clone(),
            profile: profile.profile,
            enable_audio: self.options.enable_audio,
            max_duration: self.options.max_duration(),
            orientation_hint: self.options.orientation.display_rotation(),
            preview_surface: self.surface.surface().cloned(),
        };

        let events = match start_encoder(encoder.as_mut(), &mut *rollback.camera, &config).await {
            Ok(events) => events,
            Err(e) => {
                // Encoder goes first; the rollback then reclaims the camera
                encoder.release();
                return Err(e);
            }
        };

        rollback.commit();
        Ok((profile, encoder, output_path, events))
    }

    /// Finish the recording and produce its `StopResult`.
    ///
    /// Outside `Recording` this never produces a second result: a finished
    /// session answers `NotRecording`, while an idle or previewing session
    /// (caller thinks it is recording, but no encoder exists) is cancelled.
    pub async fn stop(&mut self) -> RecorderResult<Outcome> {
        match self.phase() {
            SessionPhase::Recording => {}
            SessionPhase::Idle | SessionPhase::Previewing => {
                warn!(
                    "Stop requested in {:?} without an encoder; reporting cancellation",
                    self.phase()
                );
                self.abandon().await;
                return Ok(Outcome::Cancelled);
            }
            _ => return Err(RecordingError::not_recording()),
        }

        let SessionState::Recording(active) = mem::replace(&mut self.state, SessionState::Idle)
        else {
            return Err(RecordingError::not_recording());
        };

        match self.finish_recording(active).await {
            Ok(result) => {
                info!(
                    "Recording {} stopped: {:.1}s, {} bytes",
                    result.recording_id, result.duration, result.file_size
                );
                let outcome = Outcome::Completed(result.clone());
                self.state = SessionState::Stopped(result);
                self.deliver(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    async fn finish_recording(&mut self, active: ActiveRecording) -> RecorderResult<StopResult> {
        active.cancel_callbacks();
        self.generation += 1;

        let ActiveRecording {
            mut camera,
            mut encoder,
            session_id,
            output_path,
            profile,
            started_at,
            started_instant,
            ..
        } = active;

        let stopped = encoder.stop().await;
        let duration = started_instant.elapsed().as_secs_f64();
        let ended_at = Utc::now();

        encoder.release();
        if let Err(e) = camera.lock() {
            warn!("Failed to reclaim camera after recording: {:#}", e);
        }
        camera.stop_preview();
        camera.release();

        if let Err(e) = stopped {
            storage::discard_partial(&output_path);
            return Err(RecordingError::from_platform(
                ErrorCode::RecordingFailed,
                "Failed to stop recording",
                &e,
            ));
        }

        let file_size = storage::file_size(&output_path).map_err(|e| {
            RecordingError::from_platform(ErrorCode::FileNotFound, "Recording file is missing", &e)
        })?;

        Ok(StopResult {
            recording_id: session_id,
            video_path: output_path,
            file_size,
            duration,
            width: profile.profile.width,
            height: profile.profile.height,
            start_time: started_at,
            end_time: ended_at,
            mime_type: VIDEO_MIME_TYPE.to_string(),
        })
    }

    /// Abandon the session: stop and release the encoder (deleting its
    /// partial output), release the camera, end in `Cancelled`.
    pub async fn cancel(&mut self) -> RecorderResult<()> {
        if self.phase().is_terminal() {
            return Err(RecordingError::not_recording());
        }

        info!("Recording session cancelled");
        self.abandon().await;
        Ok(())
    }

    /// Release everything regardless of state. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        if self.phase().is_terminal() {
            debug!("Teardown of finished session");
            return;
        }

        info!("Tearing down session in {:?}", self.phase());
        self.abandon().await;
    }

    async fn abandon(&mut self) {
        match mem::replace(&mut self.state, SessionState::Cancelled) {
            SessionState::Recording(active) => {
                active.cancel_callbacks();
                self.generation += 1;

                let ActiveRecording {
                    mut camera,
                    mut encoder,
                    output_path,
                    ..
                } = active;

                if let Err(e) = encoder.stop().await {
                    warn!("Encoder did not stop cleanly during cancel: {:#}", e);
                }
                encoder.release();
                if let Err(e) = camera.lock() {
                    warn!("Failed to reclaim camera during cancel: {:#}", e);
                }
                camera.stop_preview();
                camera.release();
                storage::discard_partial(&output_path);
            }
            SessionState::Previewing(mut previewing) => {
                previewing.camera.stop_preview();
                previewing.camera.release();
            }
            SessionState::Idle => {}
            finished => {
                self.state = finished;
                return;
            }
        }

        self.deliver(Outcome::Cancelled);
    }

    // ------------------------------------------------------------------
    // Surface events
    // ------------------------------------------------------------------

    pub fn surface_ready(&mut self, surface: SurfaceHandle) -> RecorderResult<()> {
        // While recording the camera belongs to the encoder; just track the surface
        let camera = match &mut self.state {
            SessionState::Previewing(previewing) => {
                Some(previewing.camera.as_mut() as &mut dyn CameraDevice)
            }
            _ => None,
        };

        if let Err(e) = self.surface.surface_ready(surface, camera) {
            let err =
                RecordingError::from_platform(ErrorCode::CameraError, "Failed to bind preview", &e);
            self.fail(err.clone());
            return Err(err);
        }

        Ok(())
    }

    pub fn surface_resized(&mut self, width: u32, height: u32) -> Option<PreviewLayout> {
        let preview = self.state.preview_size();
        let layout = self.surface.surface_resized(
            width,
            height,
            preview,
            self.options.orientation.display_rotation(),
        );

        if let Some(layout) = layout {
            debug!(
                "Preview placed at {}x{}+{}+{}, controls {}px from bottom",
                layout.render.width,
                layout.render.height,
                layout.render.x,
                layout.render.y,
                layout.controls_bottom_margin
            );
        }

        layout
    }

    pub fn surface_destroyed(&mut self) {
        let camera = match &mut self.state {
            SessionState::Previewing(previewing) => {
                Some(previewing.camera.as_mut() as &mut dyn CameraDevice)
            }
            _ => None,
        };
        self.surface.surface_destroyed(camera);
    }

    // ------------------------------------------------------------------
    // Internal events
    // ------------------------------------------------------------------

    /// Next timer or encoder event for this session
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        let generation = match &event {
            SessionEvent::Tick { generation, .. } | SessionEvent::Encoder { generation, .. } => {
                *generation
            }
        };

        if generation != self.generation || self.phase() != SessionPhase::Recording {
            debug!("Dropping stale session event {:?}", event);
            return;
        }

        match event {
            SessionEvent::Tick { kind, .. } => self.on_tick(kind),
            SessionEvent::Encoder {
                event: EncoderEvent::MaxDurationReached,
                ..
            } => {
                info!("Maximum duration reached, stopping");
                if let Err(e) = self.stop().await {
                    error!("Automatic stop failed: {}", e);
                }
            }
            SessionEvent::Encoder {
                event: EncoderEvent::Error(message),
                ..
            } => {
                error!("Encoder fault: {}", message);
                let err = RecordingError::new(
                    ErrorCode::RecordingFailed,
                    format!("Encoder failed while recording: {}", message),
                );
                self.fail(err);
            }
        }
    }

    fn on_tick(&mut self, kind: TickKind) {
        let SessionState::Recording(active) = &self.state else {
            return;
        };
        let elapsed_secs = active.started_instant.elapsed().as_secs();

        self.indicator.send_modify(|indicator| match kind {
            TickKind::Elapsed => indicator.elapsed_secs = elapsed_secs,
            TickKind::Blink => indicator.blink_visible = !indicator.blink_visible,
        });
    }

    // ------------------------------------------------------------------
    // Terminal transitions
    // ------------------------------------------------------------------

    /// End in `Error`, releasing any handle still held first
    fn fail(&mut self, err: RecordingError) {
        match mem::replace(&mut self.state, SessionState::Failed(err.clone())) {
            SessionState::Recording(active) => {
                active.cancel_callbacks();
                self.generation += 1;

                let ActiveRecording {
                    mut camera,
                    mut encoder,
                    output_path,
                    ..
                } = active;
                encoder.release();
                camera.release();
                storage::discard_partial(&output_path);
            }
            SessionState::Previewing(mut previewing) => previewing.camera.release(),
            _ => {}
        }

        error!("Recording session failed: {}", err);
        self.deliver(Outcome::Failed(err));
    }

    /// Hand the terminal signal to the caller; only the first call delivers
    fn deliver(&mut self, outcome: Outcome) {
        self.publish_phase();

        match self.completion.take() {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!("Nobody is waiting for the session result");
                }
            }
            None => warn!("Terminal signal already delivered, dropping {:?}", outcome),
        }
    }

    fn publish_phase(&self) {
        let phase = self.phase();
        self.indicator.send_modify(|indicator| {
            indicator.phase = phase;
            if phase != SessionPhase::Recording {
                indicator.blink_visible = false;
            }
        });
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if !self.phase().is_terminal() {
            warn!("Recording session dropped in {:?}; releasing devices", self.phase());
            let err = RecordingError::new(ErrorCode::UnknownError, "Recording session was dropped");
            self.fail(err);
        }
    }
}

/// Undoes a half-finished start when dropped: reclaims and releases the
/// camera and removes the partial output.
struct StartRollback<'a> {
    camera: &'a mut dyn CameraDevice,
    output: Option<PathBuf>,
    unlocked: bool,
    committed: bool,
}

impl<'a> StartRollback<'a> {
    fn new(camera: &'a mut dyn CameraDevice) -> Self {
        Self {
            camera,
            output: None,
            unlocked: false,
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for StartRollback<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        if self.unlocked {
            if let Err(e) = self.camera.lock() {
                warn!("Failed to reclaim camera from encoder: {:#}", e);
            }
        }
        self.camera.stop_preview();
        self.camera.release();
        if let Some(path) = self.output.take() {
            storage::discard_partial(&path);
        }
    }
}

async fn start_encoder(
    encoder: &mut dyn Encoder,
    camera: &mut dyn CameraDevice,
    config: &EncoderConfig,
) -> Result<mpsc::Receiver<EncoderEvent>> {
    encoder
        .prepare(camera, config)
        .await
        .with_context(|| format!("{} encoder prepare failed", encoder.name()))?;
    encoder.start().await.context("Encoder failed to start")
}

fn session_finished() -> RecordingError {
    RecordingError::new(ErrorCode::NotRecording, "Recording session has already finished")
}

fn recording_id(started_ms: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("recording_{}_{}", started_ms, &suffix[..8])
}
