//! Recording controller: the press-to-record-to-insert state machine.
//!
//! The controller runs as a single event loop that owns all session state.
//! Hold gestures arrive on an mpsc channel, upload completions come back as
//! internal messages, and user-visible status is broadcast to the host UI.
//! Confining every transition to this one task is what enforces the
//! at-most-one-active-session invariant without locks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::asset::AudioAsset;
use crate::audio::{AudioBuffer, AudioSource, resample_capture};
use crate::config::Config;
use crate::credential::CredentialProvider;
use crate::error::TranscribeError;
use crate::inject::InsertionSink;
use crate::platform::{Appearance, AppearanceProvider, MicPermission, PermissionChecker};
use crate::session::RecordingSession;
use crate::transcribe::{Transcriber, Transcript, TranscriptionRequest};

/// Delay before the "inserted" acknowledgment reverts to ready.
pub const DEFAULT_ACK_DELAY: Duration = Duration::from_secs(1);

/// A press-and-hold gesture signal from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldEvent {
    Began,
    Ended,
    /// A cancelled or failed gesture. Treated exactly like `Ended`: the
    /// capture is stopped and whatever was recorded is still uploaded.
    Cancelled,
}

/// Controller state.
///
/// A failed upload reverts to `Idle` in the same transition that surfaces
/// the error status, so failure never appears as a resting state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Recording,
    Uploading,
    Inserting,
}

/// User-visible status, broadcast to the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ready,
    Recording,
    Processing,
    Inserted,
    Error(String),
}

/// Internal messages re-injected into the controller loop.
enum Completion {
    Transcribed {
        session: Uuid,
        outcome: Result<Transcript, TranscribeError>,
    },
    AckElapsed,
}

/// The recording controller.
///
/// One instance per keyboard lifetime; collaborators are injected so the
/// state machine itself has no platform dependency.
pub struct RecordingController {
    state: ControllerState,
    session: Option<RecordingSession>,
    source: Box<dyn AudioSource>,
    transcriber: Arc<dyn Transcriber>,
    sink: Box<dyn InsertionSink>,
    credentials: Arc<dyn CredentialProvider>,
    permissions: Arc<dyn PermissionChecker>,
    appearance: Arc<dyn AppearanceProvider>,
    model: String,
    asset_dir: PathBuf,
    min_hold: Duration,
    ack_delay: Duration,
    status_tx: broadcast::Sender<Status>,
}

impl RecordingController {
    pub fn new(
        config: &Config,
        source: Box<dyn AudioSource>,
        transcriber: Arc<dyn Transcriber>,
        sink: Box<dyn InsertionSink>,
        credentials: Arc<dyn CredentialProvider>,
        permissions: Arc<dyn PermissionChecker>,
        appearance: Arc<dyn AppearanceProvider>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        Self {
            state: ControllerState::Idle,
            session: None,
            source,
            transcriber,
            sink,
            credentials,
            permissions,
            appearance,
            model: config.api.model.clone(),
            asset_dir: config
                .audio
                .asset_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            min_hold: Duration::from_millis(config.audio.min_hold_ms),
            ack_delay: DEFAULT_ACK_DELAY,
            status_tx,
        }
    }

    /// Override the acknowledgment delay (mainly for tests).
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Subscribe to user-visible status updates.
    pub fn subscribe(&self) -> broadcast::Receiver<Status> {
        self.status_tx.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Host UI appearance, delegated to the injected provider.
    pub fn appearance(&self) -> Appearance {
        self.appearance.appearance()
    }

    /// Run the controller loop until `cancel` fires or the event channel
    /// closes. All state transitions happen on this task.
    pub async fn run(mut self, mut events: mpsc::Receiver<HoldEvent>, cancel: CancellationToken) {
        let (completion_tx, mut completion_rx) = mpsc::channel::<Completion>(8);

        info!("Recording controller started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cancellation received, stopping controller");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_hold(event, &completion_tx),
                    None => break,
                },
                Some(completion) = completion_rx.recv() => {
                    self.handle_completion(completion, &completion_tx);
                }
            }
        }
        info!("Recording controller stopped");
    }

    fn handle_hold(&mut self, event: HoldEvent, completion_tx: &mpsc::Sender<Completion>) {
        match event {
            HoldEvent::Began => self.begin_hold(),
            HoldEvent::Ended | HoldEvent::Cancelled => self.end_hold(completion_tx),
        }
    }

    /// `Idle -> Recording`, gated on microphone permission.
    fn begin_hold(&mut self) {
        if self.state != ControllerState::Idle {
            debug!(state = ?self.state, "Hold ignored: session already active");
            return;
        }

        // Fails closed: anything but an explicit grant keeps us idle.
        if self.permissions.microphone() != MicPermission::Granted {
            warn!("Microphone permission not granted");
            self.publish(Status::Error(TranscribeError::PermissionDenied.to_string()));
            return;
        }

        match self.source.start() {
            Ok(()) => {
                let session = RecordingSession::new();
                info!(session = %session.id(), "Recording started");
                self.session = Some(session);
                self.state = ControllerState::Recording;
                self.publish(Status::Recording);
            }
            Err(e) => {
                warn!(error = %e, "Failed to start capture");
                self.publish(Status::Error(e.to_string()));
            }
        }
    }

    /// `Recording -> Uploading`: stop capture synchronously, then hand the
    /// asset to exactly one upload task.
    fn end_hold(&mut self, completion_tx: &mpsc::Sender<Completion>) {
        match self.state {
            ControllerState::Recording => {}
            ControllerState::Idle => {
                debug!("Hold end without active session");
                self.publish(Status::Error(TranscribeError::NoActiveSession.to_string()));
                return;
            }
            _ => {
                // Release of a press that was rejected while busy.
                debug!(state = ?self.state, "Hold end ignored");
                return;
            }
        }

        let Some(session) = self.session.take() else {
            self.fail(TranscribeError::NoActiveSession);
            return;
        };

        let buffer = match self.source.stop() {
            Ok(buffer) => buffer,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        debug!(
            session = %session.id(),
            held_ms = session.held_for().as_millis() as u64,
            captured_secs = buffer.duration_secs(),
            "Recording stopped"
        );

        // Optional guard; off by default, in which case even a near-zero
        // capture goes up.
        if !self.min_hold.is_zero() && buffer.duration_secs() < self.min_hold.as_secs_f32() {
            self.fail(TranscribeError::CaptureTooShort);
            return;
        }

        let mut asset = match self.prepare_asset(&buffer) {
            Ok(asset) => asset,
            Err(e) => {
                self.fail(TranscribeError::DeviceUnavailable(format!(
                    "failed to store capture: {e:#}"
                )));
                return;
            }
        };

        // Credential check happens before any network activity.
        let Some(credential) = self.credentials.credential() else {
            asset.delete();
            self.fail(TranscribeError::MissingCredential);
            return;
        };

        let request = match TranscriptionRequest::from_asset(&asset, &self.model) {
            Ok(request) => request,
            Err(e) => {
                asset.delete();
                self.fail(TranscribeError::DeviceUnavailable(format!(
                    "failed to read capture: {e:#}"
                )));
                return;
            }
        };

        self.state = ControllerState::Uploading;
        self.publish(Status::Processing);

        let transcriber = Arc::clone(&self.transcriber);
        let completion_tx = completion_tx.clone();
        let session_id = session.id();
        tokio::spawn(async move {
            let outcome = transcriber.transcribe(request, &credential).await;
            // The asset is deleted exactly once, after the outcome, on both
            // success and failure paths.
            asset.delete();
            let _ = completion_tx
                .send(Completion::Transcribed {
                    session: session_id,
                    outcome,
                })
                .await;
        });
    }

    fn handle_completion(
        &mut self,
        completion: Completion,
        completion_tx: &mpsc::Sender<Completion>,
    ) {
        match completion {
            Completion::Transcribed { session, outcome } => {
                if self.state != ControllerState::Uploading {
                    warn!(%session, "Stale transcription outcome ignored");
                    return;
                }
                match outcome {
                    Ok(transcript) => self.finish_success(session, &transcript, completion_tx),
                    Err(e) => {
                        warn!(%session, error = %e, "Transcription failed");
                        self.fail(e);
                    }
                }
            }
            Completion::AckElapsed => {
                if self.state == ControllerState::Inserting {
                    self.state = ControllerState::Idle;
                    self.publish(Status::Ready);
                }
            }
        }
    }

    /// `Uploading -> Inserting`: forward the transcript, acknowledge, and
    /// schedule the revert to ready.
    fn finish_success(
        &mut self,
        session: Uuid,
        transcript: &Transcript,
        completion_tx: &mpsc::Sender<Completion>,
    ) {
        self.session = None;

        match self.sink.insert(&transcript.text) {
            Ok(()) => {
                info!(%session, chars = transcript.text.chars().count(), "Transcript inserted");
                self.state = ControllerState::Inserting;
                self.publish(Status::Inserted);

                let completion_tx = completion_tx.clone();
                let delay = self.ack_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = completion_tx.send(Completion::AckElapsed).await;
                });
            }
            Err(e) => {
                warn!(%session, error = %e, "Insertion failed");
                self.state = ControllerState::Idle;
                self.publish(Status::Error(format!("insertion failed: {e:#}")));
            }
        }
    }

    /// Terminal failure for the current session: surface the error and
    /// re-enable the entry point immediately.
    fn fail(&mut self, error: TranscribeError) {
        warn!(error = %error, "Session failed");
        self.session = None;
        self.state = ControllerState::Idle;
        self.publish(Status::Error(error.to_string()));
    }

    /// Resample the capture to 16kHz and write the transient WAV asset.
    fn prepare_asset(&self, buffer: &AudioBuffer) -> anyhow::Result<AudioAsset> {
        let resampled = resample_capture(buffer)?;
        AudioAsset::write_wav(&self.asset_dir, &resampled)
    }

    /// Broadcast a status update. Send errors (no subscribers) are ignored.
    fn publish(&self, status: Status) {
        let _ = self.status_tx.send(status);
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
