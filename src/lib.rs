//! voicekey: push-to-talk voice keyboard core.
//!
//! Press and hold to record, release to upload the capture to a cloud
//! speech-to-text API, and type the transcript into the focused application.
//! The host (keyboard extension, desktop daemon, CLI) feeds hold gestures to
//! the [`controller::RecordingController`] and renders its status broadcasts.

pub mod asset;
pub mod audio;
pub mod config;
pub mod controller;
pub mod credential;
pub mod dirs;
pub mod error;
pub mod inject;
pub mod platform;
pub mod session;
pub mod transcribe;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub use controller::{HoldEvent, RecordingController, Status};
pub use error::TranscribeError;

/// Application-specific environment variable for log filtering (overrides config).
const LOG_ENV_VAR: &str = "VOICEKEY_LOG";

/// Initialize file logging for a host process.
///
/// Logs go to `$XDG_STATE_HOME/voicekey/voicekey.log` through a non-blocking
/// writer. The returned guard must be kept alive for the life of the process
/// or buffered log lines are lost.
pub fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<WorkerGuard> {
    let log_path = dirs::log_path().context("Failed to determine log path")?;
    let log_dir = log_path
        .parent()
        .context("Log path has no parent directory")?;
    let log_filename = log_path
        .file_name()
        .context("Log path has no file name")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // VOICEKEY_LOG env var overrides the config file level
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(config.level.as_directive().parse()?)
        .from_env()?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter)
        .init();

    Ok(guard)
}
