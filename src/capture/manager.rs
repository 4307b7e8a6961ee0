//! Capture session lifecycle
//!
//! One stream/recorder pair may be active at a time. The manager hands out a
//! [`PendingCapture`] while setup runs, takes it over once recording starts,
//! and turns the recorder output into a [`VideoArtifact`] when the host
//! reports the recorder stopped.

use chrono::Local;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    CaptureError, CaptureEvent, CaptureHost, CaptureSessionId, CaptureSupport, MediaRecorder,
    MediaStream, PendingCapture, RecorderOptions, SavedArtifact, VideoArtifact,
};
use crate::config::CaptureConfig;

/// Resources of a recording in progress
struct ActiveCapture<H: CaptureHost> {
    id: CaptureSessionId,
    stream: H::Stream,
    recorder: H::Recorder,
    chunks: Vec<Vec<u8>>,
}

/// Result of feeding a host event to the manager
#[derive(Debug)]
pub enum CaptureUpdate {
    /// Event belonged to no active session
    Ignored,
    ChunkStored,
    /// Stream ended; the caller should run its stop sequence
    StreamEnded,
    /// Recorder finished and the session was torn down
    Finished(Option<VideoArtifact>),
}

pub struct CaptureManager<H: CaptureHost> {
    host: H,
    config: CaptureConfig,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    next_session: CaptureSessionId,
    active: Option<ActiveCapture<H>>,
    last_artifact: Option<SavedArtifact>,
}

impl<H: CaptureHost> CaptureManager<H> {
    pub fn new(
        host: H,
        config: CaptureConfig,
        events_tx: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Self {
        Self {
            host,
            config,
            events_tx,
            next_session: 1,
            active: None,
            last_artifact: None,
        }
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn support(&self) -> CaptureSupport {
        self.host.support()
    }

    /// A stream/recorder pair is held
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.recorder.is_recording())
            .unwrap_or(false)
    }

    pub fn active_session(&self) -> Option<CaptureSessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn last_artifact(&self) -> Option<&SavedArtifact> {
        self.last_artifact.as_ref()
    }

    pub fn set_last_artifact(&mut self, saved: SavedArtifact) {
        self.last_artifact = Some(saved);
    }

    pub fn output_directory(&self) -> PathBuf {
        self.config.output_directory()
    }

    /// Wrap a freshly granted stream in a guard with a new session id
    pub fn begin_pending(&mut self, stream: H::Stream) -> PendingCapture<H> {
        let session = self.next_session;
        self.next_session += 1;
        debug!("Capture stream granted for session {}", session);
        PendingCapture::new(session, stream)
    }

    /// Create the recorder for a pending capture
    pub fn arm_recorder(&mut self, pending: &mut PendingCapture<H>) -> Result<(), CaptureError> {
        let stream = pending
            .stream()
            .ok_or_else(|| CaptureError::Other("capture stream already released".into()))?;
        let options = RecorderOptions {
            mime_type: self.config.mime_type.clone(),
        };
        let recorder = self.host.create_recorder(
            stream,
            &options,
            pending.session(),
            self.events_tx.clone(),
        )?;
        debug!(
            "Recorder armed for session {} ({})",
            pending.session(),
            options.mime_type
        );
        pending.set_recorder(recorder);
        Ok(())
    }

    /// Start recording and take ownership of the pending resources.
    ///
    /// On failure the pending capture is dropped, which releases its stream.
    pub fn start(&mut self, mut pending: PendingCapture<H>) -> Result<CaptureSessionId, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyActive);
        }
        let recorder = pending
            .recorder_mut()
            .ok_or_else(|| CaptureError::Recorder("recorder not armed".into()))?;
        recorder.start()?;

        let id = pending.session();
        let (Some(stream), Some(recorder)) = pending.into_parts() else {
            return Err(CaptureError::Other("capture resources missing".into()));
        };
        info!("Recording started for capture session {}", id);
        self.active = Some(ActiveCapture {
            id,
            stream,
            recorder,
            chunks: Vec::new(),
        });
        Ok(id)
    }

    /// Watch the active stream for user revocation
    pub fn watch_stream_end(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.stream.watch_ended(active.id, self.events_tx.clone());
        }
    }

    /// Ask the recorder to stop. The session is finished when the host
    /// follows up with [`CaptureEvent::RecorderStopped`].
    ///
    /// Returns false when there is nothing recording.
    pub fn request_stop(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        if !active.recorder.is_recording() {
            debug!("Recorder for capture session {} already inactive", active.id);
            return false;
        }
        info!("Stopping recorder for capture session {}", active.id);
        active.recorder.stop();
        true
    }

    /// Apply a host event
    pub fn handle_event(&mut self, event: CaptureEvent) -> CaptureUpdate {
        let Some(active) = self.active.as_mut() else {
            debug!("Ignoring capture event with no active session: {:?}", event_kind(&event));
            return CaptureUpdate::Ignored;
        };
        if active.id != event.session() {
            debug!(
                "Ignoring {} for stale capture session {} (active {})",
                event_kind(&event),
                event.session(),
                active.id
            );
            return CaptureUpdate::Ignored;
        }

        match event {
            CaptureEvent::DataAvailable { chunk, .. } => {
                if !chunk.is_empty() {
                    active.chunks.push(chunk);
                }
                CaptureUpdate::ChunkStored
            }
            CaptureEvent::StreamEnded { session } => {
                info!("Capture stream ended for session {}", session);
                CaptureUpdate::StreamEnded
            }
            CaptureEvent::RecorderStopped { session } => self.finish(session),
        }
    }

    /// Tear the active session down and build its artifact
    fn finish(&mut self, session: CaptureSessionId) -> CaptureUpdate {
        let Some(mut active) = self.active.take() else {
            return CaptureUpdate::Ignored;
        };
        active.stream.stop_tracks();

        let artifact = VideoArtifact::from_chunks(
            &self.config.file_prefix,
            &self.config.mime_type,
            std::mem::take(&mut active.chunks),
            Local::now(),
        );
        drop(active);

        if artifact.is_empty() {
            warn!("Capture session {} produced no data", session);
            return CaptureUpdate::Finished(None);
        }
        info!(
            "Capture session {} finished ({} bytes)",
            session,
            artifact.bytes.len()
        );
        CaptureUpdate::Finished(Some(artifact))
    }

    /// Release everything immediately, discarding recorded data
    pub fn abort(&mut self) {
        if let Some(mut active) = self.active.take() {
            if active.recorder.is_recording() {
                active.recorder.stop();
            }
            active.stream.stop_tracks();
            warn!("Capture session {} aborted", active.id);
        }
    }
}

fn event_kind(event: &CaptureEvent) -> &'static str {
    match event {
        CaptureEvent::DataAvailable { .. } => "data",
        CaptureEvent::RecorderStopped { .. } => "recorder-stopped",
        CaptureEvent::StreamEnded { .. } => "stream-ended",
    }
}
