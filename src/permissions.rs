use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capabilities a recording session needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Camera,
    Microphone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Permission check provided by the host platform
pub trait PermissionService: Send + Sync {
    fn check(&self, capability: Capability) -> PermissionState;
}

/// Fixed answers, for hosts that resolve permissions up front
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    states: HashMap<Capability, PermissionState>,
}

impl StaticPermissions {
    pub fn granted() -> Self {
        Self::default()
            .with(Capability::Camera, PermissionState::Granted)
            .with(Capability::Microphone, PermissionState::Granted)
    }

    pub fn with(mut self, capability: Capability, state: PermissionState) -> Self {
        self.states.insert(capability, state);
        self
    }
}

impl PermissionService for StaticPermissions {
    fn check(&self, capability: Capability) -> PermissionState {
        self.states
            .get(&capability)
            .copied()
            .unwrap_or(PermissionState::Prompt)
    }
}
