//! Recording setup
//!
//! Setup is a fixed sequence of steps. Every wait inside it also listens for
//! commands: a stop or shutdown cancels the setup, anything else is queued
//! and replayed once setup is over. Resources acquired so far live in a
//! [`PendingCapture`], so any early return releases them.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::engine::Coordinator;
use super::{CoordinatorCommand, Notice, NoticeLevel, NoticeScope, ViewMode};
use crate::capture::{CaptureError, CaptureHost, CaptureSessionId, CaptureSupport, PendingCapture};
use crate::geocode::Geocoder;
use crate::viewport::{InteractionOwner, MapSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    /// At least two waypoints and a ready map
    Validate,
    /// Ask the host for a capture stream
    AcquireStream,
    /// Hide the control panel and zoom control, then let the layout settle
    HideChrome,
    /// Frame the first segment and wait for the fit animation
    EstablishingShot,
    /// Hold a still frame
    PreRoll,
    ArmRecorder,
    /// Start the recorder, then playback
    StartRecording,
    /// Listen for the user revoking the stream
    WatchStreamEnd,
}

impl SetupStep {
    pub const SEQUENCE: [SetupStep; 8] = [
        SetupStep::Validate,
        SetupStep::AcquireStream,
        SetupStep::HideChrome,
        SetupStep::EstablishingShot,
        SetupStep::PreRoll,
        SetupStep::ArmRecorder,
        SetupStep::StartRecording,
        SetupStep::WatchStreamEnd,
    ];
}

impl<M: MapSurface, H: CaptureHost, G: Geocoder> Coordinator<M, H, G> {
    pub(super) async fn start_recording(&mut self) {
        if self.capture.is_active() || self.view_mode == ViewMode::Recording {
            self.notify(Notice::new(
                NoticeLevel::Warning,
                NoticeScope::Capture,
                CaptureError::AlreadyActive.user_message(),
            ));
            return;
        }

        // A refused start leaves the current view as it was
        if let Err(e) = self.check_capture_preconditions() {
            debug!("Recording not started: {}", e);
            self.notify(Notice::new(
                NoticeLevel::Warning,
                NoticeScope::Capture,
                e.user_message(),
            ));
            return;
        }

        match self.capture.support() {
            CaptureSupport::Supported => {}
            CaptureSupport::Limited(reason) | CaptureSupport::Unsupported(reason) => {
                warn!("Screen capture support is questionable: {}", reason);
                self.notify(Notice::new(
                    NoticeLevel::Warning,
                    NoticeScope::Capture,
                    "Screen recording may not work on this device or browser.",
                ));
            }
        }

        if self.view_mode == ViewMode::Preview {
            self.exit_preview();
        }
        self.reset_playback();
        self.summary_visible = false;

        match self.run_capture_setup().await {
            Ok(session) => info!("Recording session {} running", session),
            Err(CaptureError::Cancelled) => {
                info!("Recording setup cancelled");
                self.unwind_capture_setup();
            }
            Err(e) if e.is_validation() => {
                debug!("Recording not started: {}", e);
                self.notify(Notice::new(
                    NoticeLevel::Warning,
                    NoticeScope::Capture,
                    e.user_message(),
                ));
            }
            Err(e) => {
                error!("Recording setup failed: {}", e);
                self.unwind_capture_setup();
                self.notify(Notice::new(
                    NoticeLevel::Error,
                    NoticeScope::Capture,
                    e.user_message(),
                ));
            }
        }
    }

    async fn run_capture_setup(&mut self) -> Result<CaptureSessionId, CaptureError> {
        let mut pending: Option<PendingCapture<H>> = None;
        let mut session = None;

        for step in SetupStep::SEQUENCE {
            debug!("Capture setup: {:?}", step);
            match step {
                SetupStep::Validate => self.check_capture_preconditions()?,
                SetupStep::AcquireStream => {
                    let stream = {
                        let mut request = self.capture.host_mut().request_stream();
                        loop {
                            tokio::select! {
                                result = &mut request => break result?,
                                cmd = self.cmd_rx.recv() => {
                                    intercept_setup_command(&mut self.deferred, &mut self.shutdown_requested, cmd)?;
                                }
                            }
                        }
                    };
                    pending = Some(self.capture.begin_pending(stream));
                }
                SetupStep::HideChrome => {
                    self.chrome_hidden = true;
                    self.viewport.hide_zoom_control();
                    self.viewport
                        .disable_user_interaction(InteractionOwner::CaptureSetup);
                    self.publish_status();
                    self.settle(self.config.capture.settle_delay()).await?;
                }
                SetupStep::EstablishingShot => {
                    let path = self.store.positions();
                    self.viewport.frame_to_segment(path[0], path[1]);
                    self.settle(self.config.capture.establishing_delay()).await?;
                }
                SetupStep::PreRoll => {
                    self.settle(self.config.capture.preroll_delay()).await?;
                }
                SetupStep::ArmRecorder => {
                    let pending = pending.as_mut().ok_or_else(missing_stream)?;
                    self.capture.arm_recorder(pending)?;
                }
                SetupStep::StartRecording => {
                    let pending = pending.take().ok_or_else(missing_stream)?;
                    let id = self.capture.start(pending)?;
                    session = Some(id);

                    self.viewport
                        .restore_user_interaction(InteractionOwner::CaptureSetup);
                    self.view_mode = ViewMode::Recording;
                    if !self.begin_playback() {
                        self.capture.abort();
                        return Err(CaptureError::Other("playback did not start".into()));
                    }
                    self.publish_status();
                }
                SetupStep::WatchStreamEnd => {
                    self.capture.watch_stream_end();
                }
            }
        }

        session.ok_or_else(|| CaptureError::Other("recording never started".into()))
    }

    fn check_capture_preconditions(&self) -> Result<(), CaptureError> {
        if !self.store.is_navigable() {
            return Err(CaptureError::InsufficientWaypoints);
        }
        if !self.viewport.is_ready() {
            return Err(CaptureError::MapNotReady);
        }
        Ok(())
    }

    /// Wait out `delay` while still taking commands
    async fn settle(&mut self, delay: Duration) -> Result<(), CaptureError> {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                cmd = self.cmd_rx.recv() => {
                    intercept_setup_command(&mut self.deferred, &mut self.shutdown_requested, cmd)?;
                }
            }
        }
    }

    /// Undo whatever setup changed and release capture resources
    fn unwind_capture_setup(&mut self) {
        self.capture.abort();
        self.reset_playback();
        self.viewport
            .restore_user_interaction(InteractionOwner::CaptureSetup);
        self.view_mode = ViewMode::Normal;
        self.chrome_hidden = false;
        self.summary_visible = false;
        self.viewport.restore_zoom_control();
        self.publish_status();
    }
}

fn missing_stream() -> CaptureError {
    CaptureError::Other("capture stream missing".into())
}

/// Decide what a command arriving mid-setup does
fn intercept_setup_command(
    deferred: &mut VecDeque<CoordinatorCommand>,
    shutdown_requested: &mut bool,
    cmd: Option<CoordinatorCommand>,
) -> Result<(), CaptureError> {
    match cmd {
        Some(CoordinatorCommand::StopRecording) | Some(CoordinatorCommand::StopAnimation) => {
            Err(CaptureError::Cancelled)
        }
        Some(CoordinatorCommand::Shutdown) | None => {
            *shutdown_requested = true;
            Err(CaptureError::Cancelled)
        }
        Some(CoordinatorCommand::StartRecording) => {
            warn!("Recording setup already in progress");
            Ok(())
        }
        Some(cmd) => {
            debug!("Deferring {:?} until setup finishes", cmd);
            deferred.push_back(cmd);
            Ok(())
        }
    }
}
