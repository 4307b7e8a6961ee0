//! Screen-capture recording
//!
//! The host environment provides the capture stream and the recorder through
//! [`CaptureHost`]. Everything the host reports back asynchronously (recorded
//! data, recorder stop, stream revoked by the user) arrives as a
//! [`CaptureEvent`] on a channel owned by the coordinator.
//!
//! Acquired resources live in a [`PendingCapture`] until recording actually
//! starts, so every setup exit path releases them.

mod artifact;
mod manager;
mod pending;

pub use artifact::{SavedArtifact, VideoArtifact};
pub use manager::{CaptureManager, CaptureUpdate};
pub use pending::PendingCapture;

use futures::future::LocalBoxFuture;
use thiserror::Error;
use tokio::sync::mpsc;

/// Identifies one capture attempt; events for older attempts are dropped
pub type CaptureSessionId = u64;

/// Events delivered by the host for an active capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Recorder flushed a chunk of encoded video
    DataAvailable {
        session: CaptureSessionId,
        chunk: Vec<u8>,
    },
    /// Recorder finished; no more chunks will follow
    RecorderStopped { session: CaptureSessionId },
    /// Capture stream ended outside our control (e.g. user revoked sharing)
    StreamEnded { session: CaptureSessionId },
}

impl CaptureEvent {
    pub fn session(&self) -> CaptureSessionId {
        match self {
            CaptureEvent::DataAvailable { session, .. }
            | CaptureEvent::RecorderStopped { session }
            | CaptureEvent::StreamEnded { session } => *session,
        }
    }
}

/// What the host says about screen capture before anything is attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSupport {
    Supported,
    /// Capture API exists but is known to misbehave here (e.g. touch-only mobile browsers)
    Limited(String),
    Unsupported(String),
}

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("at least two waypoints are required")]
    InsufficientWaypoints,

    #[error("map is not ready")]
    MapNotReady,

    #[error("screen capture permission denied")]
    PermissionDenied,

    #[error("screen capture unsupported: {0}")]
    Unsupported(String),

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("recorder failed: {0}")]
    Recorder(String),

    #[error("capture setup cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl CaptureError {
    /// Text shown to the user for this failure
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::InsufficientWaypoints => "Add at least two locations before recording.",
            CaptureError::MapNotReady => "The map is still loading. Try again in a moment.",
            CaptureError::PermissionDenied => {
                "Screen recording permission was denied. Allow screen capture to record your flight path."
            }
            CaptureError::Unsupported(_) => {
                "Screen recording is not supported on this device or browser. Try a desktop browser."
            }
            CaptureError::AlreadyActive => "A recording is already in progress.",
            CaptureError::Cancelled => "Recording was cancelled.",
            CaptureError::Recorder(_) | CaptureError::Other(_) => {
                "Could not start recording. Please try again."
            }
        }
    }

    /// Validation failures have no side effects to unwind
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CaptureError::InsufficientWaypoints | CaptureError::MapNotReady
        )
    }
}

/// A live capture stream
pub trait MediaStream {
    /// Release every track. Safe to call more than once.
    fn stop_tracks(&mut self);

    /// Report [`CaptureEvent::StreamEnded`] on `events` when the stream ends
    fn watch_ended(&mut self, session: CaptureSessionId, events: mpsc::UnboundedSender<CaptureEvent>);
}

/// A recorder bound to a stream
pub trait MediaRecorder {
    fn start(&mut self) -> Result<(), CaptureError>;

    /// Request a stop; the host follows up with a final
    /// [`CaptureEvent::DataAvailable`] and [`CaptureEvent::RecorderStopped`]
    fn stop(&mut self);

    fn is_recording(&self) -> bool;
}

/// Host environment that can capture the screen
pub trait CaptureHost {
    type Stream: MediaStream;
    type Recorder: MediaRecorder;

    fn support(&self) -> CaptureSupport;

    /// Ask the user for a screen/tab stream. Declining resolves to
    /// [`CaptureError::PermissionDenied`].
    fn request_stream(&mut self) -> LocalBoxFuture<'_, Result<Self::Stream, CaptureError>>;

    /// Create a recorder that reports data and stop events for `session` on `events`
    fn create_recorder(
        &mut self,
        stream: &Self::Stream,
        options: &RecorderOptions,
        session: CaptureSessionId,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<Self::Recorder, CaptureError>;
}
