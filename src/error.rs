//! Error taxonomy for the record-to-insert pipeline.
//!
//! Every variant is terminal for the current session: the controller surfaces
//! it as a status message and returns to idle. None of these abort the host
//! process.

use thiserror::Error;

/// Failure kinds produced by a recording session.
#[derive(Debug, Clone, Error)]
pub enum TranscribeError {
    /// Microphone permission has not been granted by the platform.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// Capture could not be initialized or the capture pipeline failed.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A hold-end arrived without a matching hold-begin.
    #[error("no active recording session")]
    NoActiveSession,

    /// The credential provider returned nothing; no network call was made.
    #[error("no API credential configured")]
    MissingCredential,

    /// The capture was shorter than the configured minimum hold.
    ///
    /// Only produced when `audio.min_hold_ms` is non-zero; the default
    /// behavior uploads captures of any length.
    #[error("capture too short, discarded")]
    CaptureTooShort,

    /// The request never received an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status code.
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    /// A 2xx response whose body was not the expected JSON shape.
    #[error("failed to parse API response: {0}")]
    Parse(String),
}
