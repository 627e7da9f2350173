use super::*;
use crate::audio::{AudioBuffer, TARGET_SAMPLE_RATE};
use crate::credential::Credential;
use crate::platform::FixedAppearance;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::time::timeout;

struct FakeSource {
    starts: Arc<AtomicUsize>,
    fail_start: bool,
    capturing: bool,
}

impl FakeSource {
    fn new(starts: Arc<AtomicUsize>, fail_start: bool) -> Self {
        Self {
            starts,
            fail_start,
            capturing: false,
        }
    }
}

impl AudioSource for FakeSource {
    fn start(&mut self) -> Result<(), TranscribeError> {
        if self.fail_start {
            return Err(TranscribeError::DeviceUnavailable("mic busy".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.capturing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<AudioBuffer, TranscribeError> {
        if !self.capturing {
            return Err(TranscribeError::NoActiveSession);
        }
        self.capturing = false;
        // 100ms of silence at the target rate.
        Ok(AudioBuffer::new(vec![0.0; 1600], TARGET_SAMPLE_RATE))
    }
}

struct FakeTranscriber {
    calls: Arc<AtomicUsize>,
    outcomes: Mutex<VecDeque<Result<Transcript, TranscribeError>>>,
    delay: Duration,
}

#[async_trait::async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _request: TranscriptionRequest,
        _credential: &Credential,
    ) -> Result<Transcript, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(Transcript {
            text: "hello world".to_string(),
        }))
    }
}

struct FakeSink {
    inserts: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl InsertionSink for FakeSink {
    fn insert(&mut self, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("no focused text field");
        }
        self.inserts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct FakeCredentials(Option<Credential>);

impl CredentialProvider for FakeCredentials {
    fn credential(&self) -> Option<Credential> {
        self.0.clone()
    }
}

struct FakePermissions(MicPermission);

impl PermissionChecker for FakePermissions {
    fn microphone(&self) -> MicPermission {
        self.0
    }
}

struct Options {
    permission: MicPermission,
    credential: Option<Credential>,
    outcomes: Vec<Result<Transcript, TranscribeError>>,
    transcriber_delay: Duration,
    sink_fails: bool,
    source_fails: bool,
    min_hold_ms: u64,
    ack_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            permission: MicPermission::Granted,
            credential: Some(Credential::new("test-key")),
            outcomes: Vec::new(),
            transcriber_delay: Duration::ZERO,
            sink_fails: false,
            source_fails: false,
            min_hold_ms: 0,
            ack_delay: Duration::from_millis(10),
        }
    }
}

struct Harness {
    events: mpsc::Sender<HoldEvent>,
    status: broadcast::Receiver<Status>,
    cancel: CancellationToken,
    inserts: Arc<Mutex<Vec<String>>>,
    transcribe_calls: Arc<AtomicUsize>,
    start_calls: Arc<AtomicUsize>,
    asset_dir: TempDir,
}

impl Harness {
    fn spawn(options: Options) -> Self {
        let asset_dir = TempDir::new().unwrap();
        let inserts = Arc::new(Mutex::new(Vec::new()));
        let transcribe_calls = Arc::new(AtomicUsize::new(0));
        let start_calls = Arc::new(AtomicUsize::new(0));

        let mut config = Config::default();
        config.audio.asset_dir = Some(asset_dir.path().to_path_buf());
        config.audio.min_hold_ms = options.min_hold_ms;

        let controller = RecordingController::new(
            &config,
            Box::new(FakeSource::new(Arc::clone(&start_calls), options.source_fails)),
            Arc::new(FakeTranscriber {
                calls: Arc::clone(&transcribe_calls),
                outcomes: Mutex::new(options.outcomes.into()),
                delay: options.transcriber_delay,
            }),
            Box::new(FakeSink {
                inserts: Arc::clone(&inserts),
                fail: options.sink_fails,
            }),
            Arc::new(FakeCredentials(options.credential)),
            Arc::new(FakePermissions(options.permission)),
            Arc::new(FixedAppearance(Appearance::Light)),
        )
        .with_ack_delay(options.ack_delay);

        let status = controller.subscribe();
        let (events, events_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        tokio::spawn(controller.run(events_rx, cancel.clone()));

        Self {
            events,
            status,
            cancel,
            inserts,
            transcribe_calls,
            start_calls,
            asset_dir,
        }
    }

    async fn send(&self, event: HoldEvent) {
        self.events.send(event).await.unwrap();
    }

    async fn next_status(&mut self) -> Status {
        timeout(Duration::from_secs(2), self.status.recv())
            .await
            .expect("timed out waiting for status")
            .expect("status channel closed")
    }

    fn asset_count(&self) -> usize {
        std::fs::read_dir(self.asset_dir.path()).unwrap().count()
    }

    fn inserted(&self) -> Vec<String> {
        self.inserts.lock().unwrap().clone()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_successful_session_inserts_once_and_returns_to_ready() {
    let mut h = Harness::spawn(Options::default());

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);

    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);
    assert_eq!(h.next_status().await, Status::Inserted);
    assert_eq!(h.next_status().await, Status::Ready);

    assert_eq!(h.inserted(), vec!["hello world"]);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.asset_count(), 0, "asset must be deleted after the outcome");
}

#[tokio::test]
async fn test_cancelled_hold_uploads_like_a_normal_end() {
    let mut h = Harness::spawn(Options::default());

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);

    h.send(HoldEvent::Cancelled).await;
    assert_eq!(h.next_status().await, Status::Processing);
    assert_eq!(h.next_status().await, Status::Inserted);

    assert_eq!(h.inserted(), vec!["hello world"]);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hold_during_upload_is_rejected() {
    let mut h = Harness::spawn(Options {
        transcriber_delay: Duration::from_millis(100),
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);

    // Pressed again while the upload is in flight, then released.
    h.send(HoldEvent::Began).await;
    h.send(HoldEvent::Ended).await;

    // No second recording started; the next status is the first session
    // finishing.
    assert_eq!(h.next_status().await, Status::Inserted);
    assert_eq!(h.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.inserted(), vec!["hello world"]);
}

#[tokio::test]
async fn test_repeated_begins_keep_a_single_session() {
    let mut h = Harness::spawn(Options::default());

    for _ in 0..5 {
        h.send(HoldEvent::Began).await;
    }
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;

    assert_eq!(h.next_status().await, Status::Processing);
    assert_eq!(h.next_status().await, Status::Inserted);
    assert_eq!(h.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_permission_denied_blocks_capture() {
    let mut h = Harness::spawn(Options {
        permission: MicPermission::Denied,
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("permission")),
        other => panic!("expected Error status, got {other:?}"),
    }

    assert_eq!(h.start_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undetermined_permission_fails_closed() {
    let mut h = Harness::spawn(Options {
        permission: MicPermission::Undetermined,
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert!(matches!(h.next_status().await, Status::Error(_)));
    assert_eq!(h.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_credential_fails_before_any_upload() {
    let mut h = Harness::spawn(Options {
        credential: None,
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;

    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("credential")),
        other => panic!("expected Error status, got {other:?}"),
    }

    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.asset_count(), 0, "asset must be deleted on the failure path");
}

#[tokio::test]
async fn test_api_failure_surfaces_error_and_recovers() {
    let mut h = Harness::spawn(Options {
        outcomes: vec![
            Err(TranscribeError::Api {
                status: 500,
                detail: "boom".to_string(),
            }),
            Ok(Transcript {
                text: "second take".to_string(),
            }),
        ],
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);

    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("500")),
        other => panic!("expected Error status, got {other:?}"),
    }
    assert!(h.inserted().is_empty());
    assert_eq!(h.asset_count(), 0, "asset must be deleted on failure too");

    // Failure re-enables the entry point immediately, no ack delay.
    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);
    assert_eq!(h.next_status().await, Status::Inserted);

    assert_eq!(h.inserted(), vec!["second take"]);
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_network_failure_inserts_nothing() {
    let mut h = Harness::spawn(Options {
        outcomes: vec![Err(TranscribeError::Network("connection refused".to_string()))],
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);
    assert!(matches!(h.next_status().await, Status::Error(_)));

    assert!(h.inserted().is_empty());
    assert_eq!(h.asset_count(), 0);
}

#[tokio::test]
async fn test_hold_end_without_begin_reports_no_active_session() {
    let mut h = Harness::spawn(Options::default());

    h.send(HoldEvent::Ended).await;
    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("no active")),
        other => panic!("expected Error status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_capture_start_failure_keeps_controller_idle() {
    let mut h = Harness::spawn(Options {
        source_fails: true,
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("mic busy")),
        other => panic!("expected Error status, got {other:?}"),
    }

    // Still idle, so a release has no session to end.
    h.send(HoldEvent::Ended).await;
    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("no active")),
        other => panic!("expected Error status, got {other:?}"),
    }
}

#[tokio::test]
async fn test_min_hold_guard_rejects_short_capture() {
    let mut h = Harness::spawn(Options {
        min_hold_ms: 10_000,
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;

    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("too short")),
        other => panic!("expected Error status, got {other:?}"),
    }
    assert_eq!(h.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.asset_count(), 0);
}

#[tokio::test]
async fn test_sink_failure_surfaces_error() {
    let mut h = Harness::spawn(Options {
        sink_fails: true,
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);

    match h.next_status().await {
        Status::Error(message) => assert!(message.contains("insertion failed")),
        other => panic!("expected Error status, got {other:?}"),
    }
    assert!(h.inserted().is_empty());
    assert_eq!(h.asset_count(), 0);
}

#[tokio::test]
async fn test_hold_during_ack_window_is_rejected() {
    let mut h = Harness::spawn(Options {
        ack_delay: Duration::from_millis(200),
        ..Options::default()
    });

    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
    h.send(HoldEvent::Ended).await;
    assert_eq!(h.next_status().await, Status::Processing);
    assert_eq!(h.next_status().await, Status::Inserted);

    // Pressed during the acknowledgment window.
    h.send(HoldEvent::Began).await;

    // The acknowledgment still runs its course before anything else.
    assert_eq!(h.next_status().await, Status::Ready);
    assert_eq!(h.start_calls.load(Ordering::SeqCst), 1);

    // After the revert the entry point works again.
    h.send(HoldEvent::Began).await;
    assert_eq!(h.next_status().await, Status::Recording);
}

#[tokio::test]
async fn test_appearance_is_delegated() {
    let config = Config::default();
    let controller = RecordingController::new(
        &config,
        Box::new(FakeSource::new(Arc::new(AtomicUsize::new(0)), false)),
        Arc::new(FakeTranscriber {
            calls: Arc::new(AtomicUsize::new(0)),
            outcomes: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
        }),
        Box::new(FakeSink {
            inserts: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }),
        Arc::new(FakeCredentials(None)),
        Arc::new(FakePermissions(MicPermission::Granted)),
        Arc::new(FixedAppearance(Appearance::Dark)),
    );

    assert_eq!(controller.appearance(), Appearance::Dark);
    assert_eq!(controller.state(), ControllerState::Idle);
}
