//! Platform capability seams.
//!
//! The controller never talks to platform permission or appearance APIs
//! directly; hosts inject these small traits instead, which also keeps the
//! state machine testable off-device.

/// Microphone permission state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicPermission {
    Granted,
    Denied,
    /// The user has not been asked yet. Treated as not granted: recording
    /// fails closed until the host resolves the prompt.
    Undetermined,
}

/// Platform microphone permission lookup.
pub trait PermissionChecker: Send + Sync {
    fn microphone(&self) -> MicPermission;
}

/// Permission checker for platforms without a runtime permission model.
pub struct AlwaysGranted;

impl PermissionChecker for AlwaysGranted {
    fn microphone(&self) -> MicPermission {
        MicPermission::Granted
    }
}

/// Host UI appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Appearance {
    #[default]
    Light,
    Dark,
}

/// Platform appearance lookup, surfaced to hosts via the controller so the
/// core stays platform-free.
pub trait AppearanceProvider: Send + Sync {
    fn appearance(&self) -> Appearance;
}

/// Fixed appearance, for hosts that manage theming themselves.
pub struct FixedAppearance(pub Appearance);

impl AppearanceProvider for FixedAppearance {
    fn appearance(&self) -> Appearance {
        self.0
    }
}
