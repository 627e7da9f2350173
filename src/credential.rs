//! API credential access.
//!
//! The keyboard host owns secure storage; the core only sees an opaque
//! provider. The secret is redacted from `Debug` output so it cannot leak
//! through logging.

use std::fmt;

/// An API key for the transcription endpoint.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building the authorization header.
    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of the transcription API credential.
pub trait CredentialProvider: Send + Sync {
    /// Returns the credential, or `None` when not configured.
    fn credential(&self) -> Option<Credential>;
}

/// Reads the credential from an environment variable.
///
/// Convenience for development and CLI hosts; keyboard hosts should inject
/// their own secure-storage provider.
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    /// Default environment variable.
    pub const DEFAULT_VAR: &'static str = "VOICEKEY_API_KEY";

    pub fn new() -> Self {
        Self::from_var(Self::DEFAULT_VAR)
    }

    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credential(&self) -> Option<Credential> {
        std::env::var(&self.var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Credential::new)
    }
}
