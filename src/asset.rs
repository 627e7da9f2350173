//! Transient audio assets.
//!
//! A finished capture is written to a WAV file in a scratch directory, lives
//! exactly as long as the transcription attempt, and is deleted exactly once
//! afterwards, success or failure. `Drop` is only a backstop for bugs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audio::AudioBuffer;

/// Format metadata for an audio asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A transient audio file owned by a single recording session.
#[derive(Debug)]
pub struct AudioAsset {
    path: PathBuf,
    format: AudioFormat,
    deleted: bool,
}

impl AudioAsset {
    /// Encode a capture buffer as 16-bit PCM WAV in `dir`.
    pub fn write_wav(dir: &Path, buffer: &AudioBuffer) -> Result<Self> {
        let path = dir.join(format!("voicekey-{}.wav", Uuid::new_v4()));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

        for &sample in &buffer.samples {
            let clamped = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(clamped)
                .context("Failed to write WAV sample")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        debug!(path = %path.display(), samples = buffer.samples.len(), "Wrote audio asset");

        Ok(Self {
            path,
            format: AudioFormat {
                sample_rate: buffer.sample_rate,
                channels: 1,
            },
            deleted: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Media type of the encoded file.
    pub fn mime_type(&self) -> &'static str {
        "audio/wav"
    }

    /// Read the encoded bytes.
    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .with_context(|| format!("Failed to read audio asset: {}", self.path.display()))
    }

    /// Delete the underlying file. Idempotent; later calls are no-ops.
    pub fn delete(&mut self) {
        if self.deleted {
            return;
        }
        self.deleted = true;

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Deleted audio asset"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to delete audio asset"),
        }
    }
}

impl Drop for AudioAsset {
    fn drop(&mut self) {
        if !self.deleted {
            warn!(path = %self.path.display(), "Audio asset dropped without explicit delete");
            self.delete();
        }
    }
}

#[cfg(test)]
#[path = "asset_test.rs"]
mod tests;
