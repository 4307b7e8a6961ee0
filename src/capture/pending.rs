//! Scoped ownership of capture resources during setup

use tracing::debug;

use super::{CaptureHost, CaptureSessionId, MediaRecorder, MediaStream};

/// Stream and recorder acquired by an unfinished setup.
///
/// Dropping it stops the recorder (if started) and releases the stream
/// tracks. [`PendingCapture::into_parts`] hands both over without releasing.
pub struct PendingCapture<H: CaptureHost> {
    session: CaptureSessionId,
    stream: Option<H::Stream>,
    recorder: Option<H::Recorder>,
}

impl<H: CaptureHost> PendingCapture<H> {
    pub(crate) fn new(session: CaptureSessionId, stream: H::Stream) -> Self {
        Self {
            session,
            stream: Some(stream),
            recorder: None,
        }
    }

    pub fn session(&self) -> CaptureSessionId {
        self.session
    }

    pub fn stream(&self) -> Option<&H::Stream> {
        self.stream.as_ref()
    }

    pub(crate) fn set_recorder(&mut self, recorder: H::Recorder) {
        self.recorder = Some(recorder);
    }

    pub(crate) fn recorder_mut(&mut self) -> Option<&mut H::Recorder> {
        self.recorder.as_mut()
    }

    /// Disarm the guard and take ownership of both handles
    pub(crate) fn into_parts(mut self) -> (Option<H::Stream>, Option<H::Recorder>) {
        (self.stream.take(), self.recorder.take())
    }
}

impl<H: CaptureHost> Drop for PendingCapture<H> {
    fn drop(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            if recorder.is_recording() {
                recorder.stop();
            }
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            debug!("Released capture stream for session {}", self.session);
        }
    }
}
