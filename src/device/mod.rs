pub mod backend;
pub mod simulated;

pub use backend::{
    CameraDevice, CameraParameters, CameraProvider, DeviceBackend, Encoder, EncoderConfig,
    EncoderEvent, EncoderFactory, FocusMode,
};
pub use simulated::{SimulatedBackend, SimulatedFaults, SimulatedProbe};
