//! Recording session identity.

use std::time::Instant;

use uuid::Uuid;

/// A single press-and-hold recording session.
///
/// Created when a hold begins and the permission gate passes; at most one
/// exists at a time. The session's audio asset lives in the upload task and
/// is deleted there once the transcription outcome is known.
#[derive(Debug, Clone, Copy)]
pub struct RecordingSession {
    id: Uuid,
    started_at: Instant,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Instant::now(),
        }
    }

    /// Opaque session identifier, used for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Time elapsed since the hold began.
    pub fn held_for(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}
