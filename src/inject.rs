//! Text insertion into the focused control.
//!
//! The insertion sink is the boundary between the pipeline and whatever has
//! text focus. The desktop implementation types the transcript as keystrokes,
//! with optional filtering based on an application allowlist.

use crate::config::InsertionConfig;
#[cfg(target_os = "macos")]
use anyhow::Context;
use anyhow::Result;
use enigo::{Enigo, Keyboard, Settings};
#[cfg(target_os = "macos")]
use std::process::Command;
use tracing::{debug, info, warn};

/// Receives the final transcript of a successful session.
///
/// Called at most once per session, with the full text (no chunking).
pub trait InsertionSink: Send {
    fn insert(&mut self, text: &str) -> Result<()>;
}

/// Inserts transcripts by typing them into the focused application.
pub struct KeystrokeSink {
    config: InsertionConfig,
    enigo: Enigo,
}

impl KeystrokeSink {
    /// Create a new keystroke sink with the given configuration.
    ///
    /// On macOS, this requires Accessibility permissions to be granted.
    pub fn new(config: InsertionConfig) -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("Failed to initialize enigo: {}", e))?;

        Ok(Self { config, enigo })
    }

    /// Check if an application is in the allowlist.
    fn is_allowed(&self, app_name: &str) -> bool {
        let app_lower = app_name.to_lowercase();
        self.config
            .allowlist
            .iter()
            .any(|allowed| app_lower.contains(&allowed.to_lowercase()))
    }
}

impl InsertionSink for KeystrokeSink {
    /// Type text into the focused application.
    ///
    /// If an allowlist is configured and the focused application is not in it,
    /// the text is not inserted and this method returns Ok(()).
    fn insert(&mut self, text: &str) -> Result<()> {
        if !self.config.allowlist.is_empty() {
            let frontmost = get_frontmost_app().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to get frontmost app, skipping allowlist check");
                String::new()
            });

            if !frontmost.is_empty() && !self.is_allowed(&frontmost) {
                debug!(
                    app = %frontmost,
                    "Skipping insertion: app not in allowlist"
                );
                return Ok(());
            }
        }

        info!(chars = text.chars().count(), "Inserting transcript");
        self.enigo
            .text(text)
            .map_err(|e| anyhow::anyhow!("Failed to insert text: {}", e))?;

        Ok(())
    }
}

/// Get the name of the frontmost (focused) application on macOS.
#[cfg(target_os = "macos")]
fn get_frontmost_app() -> Result<String> {
    let output = Command::new("osascript")
        .args([
            "-e",
            r#"tell application "System Events" to get name of first application process whose frontmost is true"#,
        ])
        .output()
        .context("Failed to execute osascript")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("osascript failed: {}", stderr.trim());
    }

    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(name)
}

/// Get the name of the frontmost application (stub for non-macOS platforms).
#[cfg(not(target_os = "macos"))]
fn get_frontmost_app() -> Result<String> {
    // On non-macOS platforms, return empty string to skip allowlist check
    Ok(String::new())
}

#[cfg(test)]
#[path = "inject_test.rs"]
mod tests;
