pub mod config;
pub mod device;
pub mod error;
pub mod options;
pub mod permissions;
pub mod profile;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod surface;

pub use config::Config;
pub use device::{
    CameraDevice, CameraProvider, DeviceBackend, Encoder, EncoderEvent, EncoderFactory,
    SimulatedBackend, SimulatedFaults, SimulatedProbe,
};
pub use error::{ErrorCode, RecorderResult, RecordingError};
pub use options::{CameraFacing, Orientation, Quality, RecordingOptions};
pub use permissions::{Capability, PermissionService, PermissionState, StaticPermissions};
pub use profile::{ProfileCatalog, ProfileLevel, ResolvedProfile, Size, VideoProfile};
pub use recorder::{VideoMode, VideoRecorder};
pub use session::{
    Completion, Indicator, Outcome, RecordingSession, RecordingStarted, SessionHandle,
    SessionPhase, SessionStatus, StopResult, WeakSessionHandle,
};
pub use storage::RecordingStorage;
pub use surface::{PreviewLayout, Rect, SurfaceBinding, SurfaceHandle};
