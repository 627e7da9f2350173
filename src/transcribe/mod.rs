//! Speech-to-text transcription.
//!
//! This module provides a trait abstraction for transcription backends and
//! the cloud implementation used by the keyboard.

use async_trait::async_trait;

use crate::asset::AudioAsset;
use crate::credential::Credential;
use crate::error::TranscribeError;

mod cloud;

pub use cloud::CloudTranscriber;

/// A single upload's worth of audio plus the model selector.
///
/// Constructed once per session and consumed by exactly one
/// [`Transcriber::transcribe`] call.
#[derive(Debug)]
pub struct TranscriptionRequest {
    /// Encoded audio bytes.
    pub data: Vec<u8>,
    /// Filename reported in the multipart `file` part.
    pub filename: String,
    /// Media type of `data`.
    pub mime_type: String,
    /// Model name sent in the multipart `model` field.
    pub model: String,
}

impl TranscriptionRequest {
    /// Build a request from a finished audio asset.
    ///
    /// Reads the asset's bytes; the asset itself stays with the caller, which
    /// remains responsible for deleting it after the outcome.
    pub fn from_asset(asset: &AudioAsset, model: &str) -> anyhow::Result<Self> {
        let filename = asset
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        Ok(Self {
            data: asset.read()?,
            filename,
            mime_type: asset.mime_type().to_string(),
            model: model.to_string(),
        })
    }
}

/// Transcript returned by a successful transcription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
}

/// Speech-to-text transcriber.
///
/// Implementations perform exactly one request/response cycle per call: no
/// retries, no partial results. They must not log or persist the credential
/// or the audio payload.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        credential: &Credential,
    ) -> Result<Transcript, TranscribeError>;
}
