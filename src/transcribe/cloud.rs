//! Cloud transcription backend.
//!
//! Talks to an OpenAI-compatible transcription API: multipart form upload
//! with `model` and `file` fields, bearer-token authorization, JSON response
//! with a `text` field. Groq, OpenAI, and Mistral all speak this format.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Transcriber, Transcript, TranscriptionRequest};
use crate::credential::Credential;
use crate::error::TranscribeError;

/// Maximum error-body length echoed into an `Api` error detail.
const MAX_ERROR_DETAIL: usize = 200;

/// Response structure for OpenAI-compatible APIs. Additional fields are
/// ignored.
#[derive(Deserialize)]
struct ApiResponse {
    text: String,
}

/// Transcriber backed by an OpenAI-compatible HTTP endpoint.
pub struct CloudTranscriber {
    client: reqwest::Client,
    endpoint: String,
}

impl CloudTranscriber {
    /// Create a transcriber for the given endpoint URL.
    ///
    /// Uses the transport's default timeout; a stuck request resolves as a
    /// `Network` failure when the transport gives up.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transcriber for CloudTranscriber {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
        credential: &Credential,
    ) -> Result<Transcript, TranscribeError> {
        debug!(
            endpoint = %self.endpoint,
            bytes = request.data.len(),
            model = %request.model,
            "Uploading capture for transcription"
        );

        let part = reqwest::multipart::Part::bytes(request.data)
            .file_name(request.filename)
            .mime_str(&request.mime_type)
            .map_err(|e| TranscribeError::Network(format!("failed to build request: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("model", request.model)
            .part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        if !status.is_success() {
            let detail: String = body.chars().take(MAX_ERROR_DETAIL).collect();
            return Err(TranscribeError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let parsed: ApiResponse =
            serde_json::from_str(&body).map_err(|e| TranscribeError::Parse(e.to_string()))?;

        debug!(chars = parsed.text.chars().count(), "Transcription received");

        Ok(Transcript { text: parsed.text })
    }
}

#[cfg(test)]
#[path = "cloud_test.rs"]
mod tests;
