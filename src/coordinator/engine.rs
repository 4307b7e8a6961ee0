//! Coordinator event loop
//!
//! Owns the waypoint store, the animation engine, the viewport and the
//! capture manager, and sequences them from user commands, redraw ticks and
//! host capture events. Everything runs on one task; the redraw clock is a
//! tokio interval that only exists while playback is running.

use anyhow::Result;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{
    CoordinatorCommand, CoordinatorEvent, CoordinatorStatus, Notice, NoticeLevel, NoticeScope,
    TripSummary, ViewMode,
};
use crate::animation::{AnimationEngine, FrameOutcome};
use crate::capture::{CaptureEvent, CaptureHost, CaptureManager, CaptureUpdate, VideoArtifact};
use crate::config::Config;
use crate::geocode::{Candidate, GeocodeError, Geocoder};
use crate::viewport::{MapSurface, ViewportController};
use crate::waypoints::{LocalStore, Waypoint, WaypointStore};

/// How long shutdown waits for the recorder's final chunk
const FINAL_CHUNK_TIMEOUT: Duration = Duration::from_secs(2);

type SearchOutcome = (String, Result<Vec<Candidate>, GeocodeError>);

pub struct Coordinator<M: MapSurface, H: CaptureHost, G: Geocoder> {
    pub(super) config: Config,
    pub(super) store: WaypointStore,
    local_store: LocalStore,
    pub(super) viewport: ViewportController<M>,
    pub(super) animation: AnimationEngine,
    pub(super) capture: CaptureManager<H>,
    geocoder: G,
    /// Command receiver
    pub(super) cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    /// Status/notice broadcaster
    event_tx: broadcast::Sender<CoordinatorEvent>,
    capture_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    search_tx: mpsc::UnboundedSender<SearchOutcome>,
    search_rx: mpsc::UnboundedReceiver<SearchOutcome>,
    /// Redraw clock; `None` means no frame is requested
    frame_timer: Option<Interval>,
    /// When a recording shows its summary, the moment it stops itself
    auto_stop_at: Option<Instant>,
    /// Commands that arrived while capture setup was running
    pub(super) deferred: VecDeque<CoordinatorCommand>,
    pub(super) shutdown_requested: bool,
    pub(super) view_mode: ViewMode,
    pub(super) chrome_hidden: bool,
    pub(super) summary_visible: bool,
    help_visible: bool,
    /// Readout of distance traveled, clamped to the path length
    traveled_m: f64,
}

impl<M: MapSurface, H: CaptureHost, G: Geocoder> Coordinator<M, H, G> {
    pub fn new(
        config: Config,
        map: M,
        capture_host: H,
        geocoder: G,
        local_store: LocalStore,
        cmd_rx: mpsc::Receiver<CoordinatorCommand>,
        event_tx: broadcast::Sender<CoordinatorEvent>,
    ) -> Self {
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (search_tx, search_rx) = mpsc::unbounded_channel();

        let store = WaypointStore::from_waypoints(local_store.load_waypoints());
        let help_visible = !local_store.help_seen();

        Self {
            viewport: ViewportController::new(map, &config.viewport),
            animation: AnimationEngine::new(&config.animation),
            capture: CaptureManager::new(capture_host, config.capture.clone(), capture_tx),
            config,
            store,
            local_store,
            geocoder,
            cmd_rx,
            event_tx,
            capture_rx,
            search_tx,
            search_rx,
            frame_timer: None,
            auto_stop_at: None,
            deferred: VecDeque::new(),
            shutdown_requested: false,
            view_mode: ViewMode::Normal,
            chrome_hidden: false,
            summary_visible: false,
            help_visible,
            traveled_m: 0.0,
        }
    }

    /// Run the coordinator until `Shutdown` or the command channel closes
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Coordinator starting with {} stored waypoints",
            self.store.len()
        );
        self.publish_status();

        loop {
            while let Some(cmd) = self.deferred.pop_front() {
                if self.handle_command(cmd).await.is_break() {
                    self.shutdown_requested = true;
                }
            }
            if self.shutdown_requested {
                break;
            }

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if self.handle_command(cmd).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!("Command channel closed");
                            break;
                        }
                    }
                }

                Some(event) = self.capture_rx.recv() => {
                    self.handle_capture_event(event).await;
                }

                now = next_frame(&mut self.frame_timer) => {
                    self.handle_frame(now).await;
                }

                _ = sleep_until_opt(self.auto_stop_at) => {
                    self.handle_auto_stop().await;
                }

                Some((query, result)) = self.search_rx.recv() => {
                    self.handle_search_outcome(query, result);
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    pub(super) async fn handle_command(&mut self, cmd: CoordinatorCommand) -> ControlFlow<()> {
        debug!("Command: {:?}", cmd);
        match cmd {
            CoordinatorCommand::AddWaypoint(waypoint) => self.add_waypoint(waypoint),
            CoordinatorCommand::RemoveWaypoint(id) => self.remove_waypoint(&id),
            CoordinatorCommand::Search(query) => self.search(query),
            CoordinatorCommand::StartAnimation => self.start_animation(),
            CoordinatorCommand::StopAnimation => self.stop_animation().await,
            CoordinatorCommand::StartRecording => self.start_recording().await,
            CoordinatorCommand::StopRecording => self.stop_recording_sequence().await,
            CoordinatorCommand::EnterPreview => self.enter_preview(),
            CoordinatorCommand::DismissSummary => self.dismiss_summary(),
            CoordinatorCommand::DismissHelp => self.dismiss_help(),
            CoordinatorCommand::Shutdown => {
                info!("Shutdown command received");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn add_waypoint(&mut self, waypoint: Waypoint) {
        self.reset_playback();
        info!("Waypoint added: {}", waypoint.name);
        self.store.add(waypoint);
        self.waypoints_changed();
    }

    fn remove_waypoint(&mut self, id: &str) {
        self.reset_playback();
        match self.store.remove(id) {
            Some(removed) => {
                info!("Waypoint removed: {}", removed.name);
                self.waypoints_changed();
            }
            None => {
                debug!("No waypoint with id {}", id);
                self.publish_status();
            }
        }
    }

    fn waypoints_changed(&mut self) {
        if self.view_mode == ViewMode::Preview {
            self.exit_preview();
        }
        if let Err(e) = self.local_store.save_waypoints(self.store.waypoints()) {
            warn!("Failed to save waypoints: {:#}", e);
        }
        self.publish_status();
    }

    fn start_animation(&mut self) {
        if self.view_mode == ViewMode::Recording {
            debug!("Playback is driven by the recording");
            return;
        }
        if !self.store.is_navigable() {
            self.notify(Notice::new(
                NoticeLevel::Warning,
                NoticeScope::General,
                "Add at least two locations to animate the path.",
            ));
            return;
        }
        self.begin_playback();
        self.publish_status();
    }

    async fn stop_animation(&mut self) {
        match self.view_mode {
            ViewMode::Recording => self.stop_recording_sequence().await,
            ViewMode::Preview => {
                self.exit_preview();
                self.publish_status();
            }
            ViewMode::Normal => {
                self.reset_playback();
                self.publish_status();
            }
        }
    }

    fn enter_preview(&mut self) {
        if self.view_mode != ViewMode::Normal {
            debug!("Preview unavailable in {:?} mode", self.view_mode);
            return;
        }
        if !self.store.is_navigable() {
            self.notify(Notice::new(
                NoticeLevel::Warning,
                NoticeScope::General,
                "Add at least two locations to preview the flight.",
            ));
            return;
        }
        self.reset_playback();
        self.view_mode = ViewMode::Preview;
        self.chrome_hidden = true;
        if !self.begin_playback() {
            self.exit_preview();
        }
        self.publish_status();
    }

    pub(super) fn exit_preview(&mut self) {
        info!("Leaving preview");
        self.reset_playback();
        self.view_mode = ViewMode::Normal;
        self.chrome_hidden = false;
        self.summary_visible = false;
    }

    fn dismiss_summary(&mut self) {
        match self.view_mode {
            ViewMode::Preview => self.exit_preview(),
            // The recording closes its own summary
            ViewMode::Recording => return,
            ViewMode::Normal => self.summary_visible = false,
        }
        self.publish_status();
    }

    fn dismiss_help(&mut self) {
        self.help_visible = false;
        if let Err(e) = self.local_store.mark_help_seen() {
            warn!("Failed to persist help flag: {:#}", e);
        }
        self.publish_status();
    }

    fn search(&mut self, query: String) {
        let lookup = self.geocoder.search(&query);
        let tx = self.search_tx.clone();
        tokio::spawn(async move {
            let result = lookup.await;
            let _ = tx.send((query, result));
        });
    }

    pub(super) fn handle_search_outcome(
        &mut self,
        query: String,
        result: Result<Vec<Candidate>, GeocodeError>,
    ) {
        match result {
            Ok(candidates) => {
                if candidates.is_empty() {
                    self.notify(Notice::new(
                        NoticeLevel::Info,
                        NoticeScope::Search,
                        format!("No places found for \"{}\".", query),
                    ));
                }
                let _ = self
                    .event_tx
                    .send(CoordinatorEvent::SearchResults { query, candidates });
            }
            Err(e) => {
                warn!("Search for {:?} failed: {}", query, e);
                self.notify(Notice::new(
                    NoticeLevel::Warning,
                    NoticeScope::Search,
                    e.user_message(),
                ));
            }
        }
    }

    /// Start the engine and request frames. Returns false if nothing started.
    pub(super) fn begin_playback(&mut self) -> bool {
        if !self.animation.start(&self.store, &mut self.viewport) {
            return false;
        }
        self.traveled_m = 0.0;
        self.summary_visible = false;
        let mut timer = tokio::time::interval(self.config.animation.frame_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.frame_timer = Some(timer);
        true
    }

    /// Cancel the pending frame and return the engine to Idle
    pub(super) fn reset_playback(&mut self) {
        self.frame_timer = None;
        self.animation.stop(&mut self.viewport);
        self.traveled_m = 0.0;
    }

    pub(super) async fn handle_frame(&mut self, now: Instant) {
        let outcome = self
            .animation
            .on_frame(now, self.store.revision(), &mut self.viewport);
        match outcome {
            FrameOutcome::Inactive => {
                self.frame_timer = None;
            }
            FrameOutcome::Aborted => {
                self.frame_timer = None;
                self.traveled_m = 0.0;
                self.publish_status();
            }
            FrameOutcome::Advanced(report) => {
                if let Some(delta) = report.distance_delta_m {
                    self.add_traveled(delta);
                    self.publish_status();
                }
            }
            FrameOutcome::Completed(report) => {
                self.frame_timer = None;
                if let Some(delta) = report.distance_delta_m {
                    self.add_traveled(delta);
                }
                self.playback_completed();
                self.publish_status();
            }
        }
    }

    fn add_traveled(&mut self, delta_m: f64) {
        self.traveled_m = (self.traveled_m + delta_m).min(self.store.total_distance_m());
    }

    fn playback_completed(&mut self) {
        info!("Playback finished in {:?} mode", self.view_mode);
        match self.view_mode {
            ViewMode::Recording => {
                self.summary_visible = true;
                self.auto_stop_at = Some(Instant::now() + self.config.summary.auto_stop_delay());
            }
            ViewMode::Preview => {
                self.summary_visible = true;
            }
            ViewMode::Normal => {
                // Readout stays at the final distance
                self.frame_timer = None;
                self.animation.stop(&mut self.viewport);
            }
        }
    }

    pub(super) async fn handle_auto_stop(&mut self) {
        self.auto_stop_at = None;
        info!("Summary shown, stopping recording");
        self.stop_recording_sequence().await;
    }

    pub(super) async fn handle_capture_event(&mut self, event: CaptureEvent) {
        match self.capture.handle_event(event) {
            CaptureUpdate::Ignored | CaptureUpdate::ChunkStored => {}
            CaptureUpdate::StreamEnded => {
                info!("Screen sharing ended by the user");
                self.stop_recording_sequence().await;
            }
            CaptureUpdate::Finished(artifact) => {
                let unrequested = self.view_mode == ViewMode::Recording;
                self.deliver_artifact(artifact).await;
                if unrequested {
                    warn!("Recorder stopped without a stop request");
                    self.stop_recording_sequence().await;
                }
            }
        }
    }

    async fn deliver_artifact(&mut self, artifact: Option<VideoArtifact>) {
        let Some(artifact) = artifact else {
            self.notify(Notice::new(
                NoticeLevel::Warning,
                NoticeScope::Capture,
                "The recording was empty and was not saved.",
            ));
            return;
        };

        let dir = self.capture.output_directory();
        match artifact.save_to(&dir).await {
            Ok(saved) => {
                let message = format!("Recording saved to {}", saved.path.display());
                self.capture.set_last_artifact(saved);
                self.notify(Notice::new(NoticeLevel::Info, NoticeScope::Capture, message));
            }
            Err(e) => {
                error!("Failed to save recording: {:#}", e);
                self.notify(Notice::new(
                    NoticeLevel::Error,
                    NoticeScope::Capture,
                    "The recording could not be saved.",
                ));
            }
        }
        self.publish_status();
    }

    /// Stop any recording and put the presentation back to normal.
    ///
    /// Idempotent: safe from an explicit stop, a stream-ended event or the
    /// post-summary timer, in any order.
    pub(super) async fn stop_recording_sequence(&mut self) {
        self.auto_stop_at = None;
        if self.capture.request_stop() {
            debug!("Recorder stop requested");
        }
        self.reset_playback();
        self.view_mode = ViewMode::Normal;
        self.chrome_hidden = false;
        self.summary_visible = false;
        self.viewport.restore_zoom_control();
        self.publish_status();
    }

    async fn shutdown(&mut self) {
        if self.capture.is_active() {
            self.stop_recording_sequence().await;
            let deadline = Instant::now() + FINAL_CHUNK_TIMEOUT;
            while self.capture.is_active() {
                match tokio::time::timeout_at(deadline, self.capture_rx.recv()).await {
                    Ok(Some(event)) => self.handle_capture_event(event).await,
                    _ => break,
                }
            }
            self.capture.abort();
        }
        self.reset_playback();
        info!("Coordinator stopped");
    }

    pub(super) fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Warning | NoticeLevel::Error => warn!("{}", notice.message),
        }
        let _ = self.event_tx.send(CoordinatorEvent::Notice(notice));
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            view_mode: self.view_mode,
            playback: self.animation.phase(),
            recording: self.view_mode == ViewMode::Recording,
            chrome_hidden: self.chrome_hidden,
            exit_control_visible: self.view_mode == ViewMode::Preview,
            summary: self.summary_visible.then(|| self.trip_summary()),
            help_visible: self.help_visible,
            waypoints: self.store.waypoints().to_vec(),
            total_distance_m: self.store.total_distance_m(),
            traveled_m: self.traveled_m,
            capture_support: self.capture.support(),
            last_recording: self.capture.last_artifact().map(|a| a.path.clone()),
        }
    }

    fn trip_summary(&self) -> TripSummary {
        TripSummary {
            waypoint_names: self.store.waypoints().iter().map(|w| w.name.clone()).collect(),
            total_distance_m: self.store.total_distance_m(),
            countries: self.store.countries(),
        }
    }

    pub(super) fn publish_status(&self) {
        let _ = self.event_tx.send(CoordinatorEvent::Status(self.status()));
    }
}

async fn next_frame(timer: &mut Option<Interval>) -> Instant {
    match timer.as_mut() {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Create command and event channels for the coordinator
pub fn create_coordinator_channels() -> (
    mpsc::Sender<CoordinatorCommand>,
    mpsc::Receiver<CoordinatorCommand>,
    broadcast::Sender<CoordinatorEvent>,
    broadcast::Receiver<CoordinatorEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = broadcast::channel(64);
    (cmd_tx, cmd_rx, event_tx, event_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::PlaybackPhase;
    use crate::capture::{CaptureError, CaptureSupport};
    use crate::testing::{
        candidate, end_stream, CaptureLog, FakeCaptureHost, FakeGeocoder, FakeMap, MapCall,
    };
    use crate::viewport::InteractionMode;
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestCoordinator = Coordinator<FakeMap, FakeCaptureHost, FakeGeocoder>;

    struct Harness {
        coord: TestCoordinator,
        cmd_tx: mpsc::Sender<CoordinatorCommand>,
        events: broadcast::Receiver<CoordinatorEvent>,
        log: Rc<RefCell<CaptureLog>>,
        dir: tempfile::TempDir,
    }

    fn harness_with(host: FakeCaptureHost, geocoder: FakeGeocoder, points: &[(&str, f64, f64, &str)]) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.capture.output_directory = Some(dir.path().join("recordings"));
        let local_store = LocalStore::new(dir.path().join("data"));
        let waypoints: Vec<Waypoint> = points
            .iter()
            .map(|(name, lat, lng, cc)| Waypoint::new(*name, *lat, *lng, *cc))
            .collect();
        local_store.save_waypoints(&waypoints).unwrap();

        let log = host.log();
        let (cmd_tx, cmd_rx, event_tx, events) = create_coordinator_channels();
        let coord = Coordinator::new(config, FakeMap::new(), host, geocoder, local_store, cmd_rx, event_tx);
        Harness {
            coord,
            cmd_tx,
            events,
            log,
            dir,
        }
    }

    fn harness(points: &[(&str, f64, f64, &str)]) -> Harness {
        harness_with(FakeCaptureHost::new(), FakeGeocoder::default(), points)
    }

    const LONDON_PARIS: &[(&str, f64, f64, &str)] = &[("London", 51.5, -0.1, "gb"), ("Paris", 48.9, 2.3, "fr")];

    fn drain(events: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
        let mut out = Vec::new();
        loop {
            match events.try_recv() {
                Ok(event) => out.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    fn notices(events: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<Notice> {
        drain(events)
            .into_iter()
            .filter_map(|e| match e {
                CoordinatorEvent::Notice(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// Drive frames 16 ms apart until playback leaves the playing phases
    async fn play_to_end(coord: &mut TestCoordinator) {
        let t0 = Instant::now();
        for i in 0..10_000u64 {
            if !coord.animation.is_playing() {
                return;
            }
            coord.handle_frame(t0 + Duration::from_millis(16 * i)).await;
        }
        panic!("playback never finished");
    }

    async fn pump_capture(coord: &mut TestCoordinator) {
        while let Ok(event) = coord.capture_rx.try_recv() {
            coord.handle_capture_event(event).await;
        }
    }

    #[tokio::test]
    async fn test_loads_stored_waypoints_and_help_state() {
        let mut h = harness(LONDON_PARIS);
        assert_eq!(h.coord.store.len(), 2);
        assert!(h.coord.status().help_visible);

        h.coord.handle_command(CoordinatorCommand::DismissHelp).await;
        assert!(!h.coord.status().help_visible);
        assert!(LocalStore::new(h.dir.path().join("data")).help_seen());
    }

    #[tokio::test]
    async fn test_start_with_one_waypoint_is_noop() {
        let mut h = harness(&[("London", 51.5, -0.1, "gb")]);
        h.coord.handle_command(CoordinatorCommand::StartAnimation).await;

        assert_eq!(h.coord.animation.phase(), PlaybackPhase::Idle);
        assert!(h.coord.viewport.map().markers.is_empty());
        assert!(h.coord.frame_timer.is_none());
        let notices = notices(&mut h.events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_mutation_mid_playback_forces_idle() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartAnimation).await;
        let t0 = Instant::now();
        h.coord.handle_frame(t0).await;
        h.coord.handle_frame(t0 + Duration::from_millis(1200)).await;
        assert_eq!(h.coord.animation.phase(), PlaybackPhase::SegmentPlaying);
        assert!(h.coord.status().traveled_m > 0.0);

        h.coord
            .handle_command(CoordinatorCommand::AddWaypoint(Waypoint::new("Berlin", 52.52, 13.405, "de")))
            .await;
        let status = h.coord.status();
        assert_eq!(status.playback, PlaybackPhase::Idle);
        assert_eq!(status.traveled_m, 0.0);
        assert!(h.coord.frame_timer.is_none());
        assert!(h.coord.viewport.map().markers.is_empty());

        // A late frame after the mutation emits nothing
        h.coord.handle_frame(t0 + Duration::from_millis(1216)).await;
        assert_eq!(h.coord.status().traveled_m, 0.0);
        assert_eq!(LocalStore::new(h.dir.path().join("data")).load_waypoints().len(), 3);
    }

    #[tokio::test]
    async fn test_removal_mid_segment_goes_idle() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartAnimation).await;
        let t0 = Instant::now();
        h.coord.handle_frame(t0).await;
        h.coord.handle_frame(t0 + Duration::from_millis(2500)).await;

        let id = h.coord.store.waypoints()[1].id.clone();
        h.coord.handle_command(CoordinatorCommand::RemoveWaypoint(id)).await;
        assert_eq!(h.coord.store.len(), 1);
        assert_eq!(h.coord.animation.phase(), PlaybackPhase::Idle);
        assert!(h.coord.viewport.map().interaction_enabled(InteractionMode::Drag));
    }

    #[tokio::test]
    async fn test_normal_completion_returns_to_idle_without_summary() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartAnimation).await;
        play_to_end(&mut h.coord).await;

        let status = h.coord.status();
        assert_eq!(status.playback, PlaybackPhase::Idle);
        assert!(status.summary.is_none());
        assert!(!status.chrome_hidden);
        assert!(status.traveled_m <= status.total_distance_m);
        assert!((status.traveled_m - status.total_distance_m).abs() / status.total_distance_m < 0.005);
    }

    #[tokio::test]
    async fn test_preview_waits_for_tap() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::EnterPreview).await;
        let status = h.coord.status();
        assert_eq!(status.view_mode, ViewMode::Preview);
        assert!(status.chrome_hidden);
        assert!(status.exit_control_visible);

        play_to_end(&mut h.coord).await;
        let status = h.coord.status();
        assert_eq!(status.playback, PlaybackPhase::Completed);
        let summary = status.summary.expect("summary visible");
        assert_eq!(summary.countries, vec!["gb".to_string(), "fr".to_string()]);
        assert!(h.coord.auto_stop_at.is_none());

        h.coord.handle_command(CoordinatorCommand::DismissSummary).await;
        let status = h.coord.status();
        assert_eq!(status.view_mode, ViewMode::Normal);
        assert_eq!(status.playback, PlaybackPhase::Idle);
        assert!(!status.chrome_hidden);
        assert!(status.summary.is_none());
        assert!(h.coord.viewport.map().markers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_runs_setup_in_order() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        let status = h.coord.status();
        assert_eq!(status.view_mode, ViewMode::Recording);
        assert!(status.recording);
        assert!(status.chrome_hidden);
        assert_eq!(status.playback, PlaybackPhase::SegmentEntering);
        assert!(h.coord.capture.is_recording());
        assert!(h.coord.capture.active_session().is_some());

        let calls = &h.coord.viewport.map().calls;
        let zoom_removed = calls.iter().position(|c| *c == MapCall::RemoveZoomControl).unwrap();
        let establishing = calls.iter().position(|c| matches!(c, MapCall::FitBounds(..))).unwrap();
        let marker = calls.iter().position(|c| matches!(c, MapCall::AddMarker(_))).unwrap();
        assert!(zoom_removed < establishing && establishing < marker);

        let log = h.log.borrow();
        assert_eq!(log.streams_acquired, 1);
        assert_eq!(log.recorders_started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_completion_shows_summary_then_auto_stops() {
        let mut h = harness(LONDON_PARIS);
        let mut map_before = FakeMap::new();
        map_before.set_interaction(InteractionMode::Keyboard, false);
        h.coord.viewport = ViewportController::new(map_before, &h.coord.config.viewport);

        h.coord.handle_command(CoordinatorCommand::StartRecording).await;
        play_to_end(&mut h.coord).await;

        let status = h.coord.status();
        assert!(status.summary.is_some());
        assert!(status.recording);
        assert!(h.coord.auto_stop_at.is_some());

        h.coord.handle_auto_stop().await;
        pump_capture(&mut h.coord).await;

        let status = h.coord.status();
        assert!(!status.recording);
        assert!(!status.chrome_hidden);
        assert!(status.summary.is_none());
        assert_eq!(status.playback, PlaybackPhase::Idle);
        let path = status.last_recording.expect("artifact saved");
        assert!(path.starts_with(h.dir.path().join("recordings")));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("flight-path-"));
        assert_eq!(std::fs::read(&path).unwrap(), b"webm-cluster");

        assert!(h.coord.viewport.map().has_zoom_control());
        assert!(h.coord.viewport.map().interaction_enabled(InteractionMode::Drag));
        assert!(!h.coord.viewport.map().interaction_enabled(InteractionMode::Keyboard));

        let log = h.log.borrow();
        assert_eq!(log.streams_released, 1);
        assert_eq!(log.recorders_created, log.recorders_dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ended_runs_stop_sequence() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;
        let session = h.coord.capture.active_session().unwrap();
        h.coord.handle_frame(Instant::now()).await;

        end_stream(&h.log, session);
        pump_capture(&mut h.coord).await;

        let status = h.coord.status();
        assert!(!status.recording);
        assert!(!status.chrome_hidden);
        assert_eq!(status.playback, PlaybackPhase::Idle);
        assert!(!h.coord.capture.is_active());
        assert!(status.last_recording.is_some());

        // A second stop is harmless
        h.coord.handle_command(CoordinatorCommand::StopRecording).await;
        let log = h.log.borrow();
        assert_eq!(log.streams_released, 1);
        assert_eq!(log.recorders_stopped, 1);
        assert_eq!(log.recorders_created, log.recorders_dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_stopping_first_still_runs_stop_sequence() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;
        h.coord.handle_frame(Instant::now()).await;
        let session = h.coord.capture.active_session().unwrap();

        h.coord
            .handle_capture_event(CaptureEvent::DataAvailable {
                session,
                chunk: b"partial".to_vec(),
            })
            .await;
        h.coord
            .handle_capture_event(CaptureEvent::RecorderStopped { session })
            .await;
        // Session is already finished, so this one is stale
        h.coord
            .handle_capture_event(CaptureEvent::StreamEnded { session })
            .await;

        let status = h.coord.status();
        assert_eq!(status.view_mode, ViewMode::Normal);
        assert!(!status.recording);
        assert!(!status.chrome_hidden);
        assert_eq!(status.playback, PlaybackPhase::Idle);
        assert!(status.last_recording.is_some());
        assert!(h.coord.frame_timer.is_none());
        assert!(h.coord.viewport.map().has_zoom_control());

        let log = h.log.borrow();
        assert_eq!(log.streams_released, 1);
        assert_eq!(log.recorders_created, log.recorders_dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_restores_prior_interactions() {
        let mut h = harness(LONDON_PARIS);
        let mut map_before = FakeMap::new();
        map_before.set_interaction(InteractionMode::Keyboard, false);
        h.coord.viewport = ViewportController::new(map_before, &h.coord.config.viewport);

        h.coord.handle_command(CoordinatorCommand::StartRecording).await;
        let t0 = Instant::now();
        for i in 0..5u64 {
            h.coord.handle_frame(t0 + Duration::from_millis(16 * i)).await;
        }
        assert!(h.coord.status().recording);
        assert!(!h.coord.viewport.map().interaction_enabled(InteractionMode::Drag));

        h.coord.handle_command(CoordinatorCommand::StopRecording).await;
        pump_capture(&mut h.coord).await;

        let status = h.coord.status();
        assert!(!status.recording);
        assert!(!status.chrome_hidden);
        assert_eq!(status.playback, PlaybackPhase::Idle);
        assert!(status.last_recording.is_some());
        assert!(!h.coord.capture.is_active());

        let map = h.coord.viewport.map();
        assert!(map.has_zoom_control());
        assert!(map.interaction_enabled(InteractionMode::Drag));
        assert!(!map.interaction_enabled(InteractionMode::Keyboard));

        let log = h.log.borrow();
        assert_eq!(log.streams_released, 1);
        assert_eq!(log.recorders_stopped, 1);
        assert_eq!(log.recorders_created, log.recorders_dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_unwinds() {
        let host = FakeCaptureHost::new().denying(CaptureError::PermissionDenied);
        let mut h = harness_with(host, FakeGeocoder::default(), LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        let status = h.coord.status();
        assert!(!status.chrome_hidden);
        assert!(!status.recording);
        assert_eq!(status.view_mode, ViewMode::Normal);
        assert!(h.coord.viewport.map().markers.is_empty());
        assert!(!h.coord.capture.is_active());

        let notices = notices(&mut h.events);
        let capture_notice = notices.iter().find(|n| n.scope == NoticeScope::Capture).unwrap();
        assert_eq!(capture_notice.level, NoticeLevel::Error);
        assert_eq!(capture_notice.message, CaptureError::PermissionDenied.user_message());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_failure_releases_stream_and_chrome() {
        let host = FakeCaptureHost::new().failing_recorder_start();
        let mut h = harness_with(host, FakeGeocoder::default(), LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        let status = h.coord.status();
        assert!(!status.chrome_hidden);
        assert!(!status.recording);
        assert!(h.coord.viewport.map().has_zoom_control());
        assert!(h.coord.viewport.map().markers.is_empty());

        let log = h.log.borrow();
        assert_eq!(log.streams_acquired, 1);
        assert_eq!(log.streams_released, 1);
        assert_eq!(log.recorders_created, log.recorders_dropped);
        drop(log);

        let notices = notices(&mut h.events);
        assert!(notices
            .iter()
            .any(|n| n.message == CaptureError::Other(String::new()).user_message()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_with_one_waypoint_is_validation_error() {
        let mut h = harness(&[("London", 51.5, -0.1, "gb")]);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        assert_eq!(h.log.borrow().stream_requests, 0);
        assert!(!h.coord.status().chrome_hidden);
        let notices = notices(&mut h.events);
        assert!(notices
            .iter()
            .any(|n| n.message == CaptureError::InsufficientWaypoints.user_message()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_start_leaves_preview_untouched() {
        let host = FakeCaptureHost::new().with_support(CaptureSupport::Limited("touch-only browser".into()));
        let mut h = harness_with(host, FakeGeocoder::default(), LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::EnterPreview).await;
        h.coord.handle_frame(Instant::now()).await;
        let playback = h.coord.status().playback;
        assert_ne!(playback, PlaybackPhase::Idle);

        h.coord.viewport.map_mut().ready = false;
        drain(&mut h.events);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        let status = h.coord.status();
        assert_eq!(status.view_mode, ViewMode::Preview);
        assert_eq!(status.playback, playback);
        assert!(status.chrome_hidden);
        assert_eq!(h.log.borrow().stream_requests, 0);

        let notices = notices(&mut h.events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(notices[0].message, CaptureError::MapNotReady.user_message());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let mut h = harness(LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;
        drain(&mut h.events);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        assert_eq!(h.log.borrow().stream_requests, 1);
        assert!(h.coord.capture.is_recording());
        let notices = notices(&mut h.events);
        assert!(notices
            .iter()
            .any(|n| n.message == CaptureError::AlreadyActive.user_message()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limited_support_warns_before_attempt() {
        let host = FakeCaptureHost::new()
            .with_support(CaptureSupport::Limited("touch-only browser".into()))
            .denying(CaptureError::Unsupported("getDisplayMedia missing".into()));
        let mut h = harness_with(host, FakeGeocoder::default(), LONDON_PARIS);
        h.coord.handle_command(CoordinatorCommand::StartRecording).await;

        let notices = notices(&mut h.events);
        assert!(notices.len() >= 2);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(
            notices.last().unwrap().message,
            CaptureError::Unsupported(String::new()).user_message()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_setup_cancels_and_releases() {
        let mut h = harness(LONDON_PARIS);
        let cmd_tx = h.cmd_tx.clone();
        let script = async move {
            cmd_tx.send(CoordinatorCommand::StartRecording).await.unwrap();
            // Lands inside the settle delay after the stream was granted
            tokio::time::sleep(Duration::from_millis(50)).await;
            cmd_tx.send(CoordinatorCommand::StopRecording).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        };
        let (result, ()) = tokio::join!(h.coord.run(), script);
        result.unwrap();

        let status = h.coord.status();
        assert!(!status.chrome_hidden);
        assert!(!status.recording);
        assert!(h.coord.viewport.map().has_zoom_control());
        let log = h.log.borrow();
        assert_eq!(log.streams_acquired, 1);
        assert_eq!(log.streams_released, 1);
        assert_eq!(log.recorders_created, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_during_setup_are_deferred() {
        let mut h = harness(LONDON_PARIS);
        let cmd_tx = h.cmd_tx.clone();
        let script = async move {
            cmd_tx.send(CoordinatorCommand::StartRecording).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            cmd_tx.send(CoordinatorCommand::DismissHelp).await.unwrap();
            // Past the settle, establishing and pre-roll delays
            tokio::time::sleep(Duration::from_millis(3000)).await;
            cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        };
        let (result, ()) = tokio::join!(h.coord.run(), script);
        result.unwrap();

        // Setup completed, then help was dismissed, then shutdown released everything
        assert!(!h.coord.status().help_visible);
        assert_eq!(h.log.borrow().recorders_started, 1);
        assert!(!h.coord.capture.is_active());
        assert_eq!(h.log.borrow().streams_released, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_records_and_auto_stops() {
        let mut h = harness(LONDON_PARIS);
        let mut events = h.coord.event_tx.subscribe();
        let cmd_tx = h.cmd_tx.clone();
        let script = async move {
            cmd_tx.send(CoordinatorCommand::StartRecording).await.unwrap();
            loop {
                match events.recv().await {
                    Ok(CoordinatorEvent::Notice(n)) if n.scope == NoticeScope::Capture && n.level == NoticeLevel::Info => break,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event channel closed: {}", e),
                }
            }
            cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        };
        let (result, ()) = tokio::join!(h.coord.run(), script);
        result.unwrap();

        let status = h.coord.status();
        assert!(status.last_recording.is_some());
        assert!(!status.chrome_hidden);
        assert_eq!(h.log.borrow().streams_released, 1);
    }

    #[tokio::test]
    async fn test_search_results_and_failures() {
        let geocoder = FakeGeocoder::default();
        geocoder
            .places
            .lock()
            .unwrap()
            .push(candidate("London", 51.5, -0.1, "gb"));
        let mut h = harness_with(FakeCaptureHost::new(), geocoder, &[]);

        h.coord.handle_command(CoordinatorCommand::Search("lon".into())).await;
        let (query, result) = h.coord.search_rx.recv().await.unwrap();
        h.coord.handle_search_outcome(query, result);
        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            CoordinatorEvent::SearchResults { candidates, .. } if candidates.len() == 1
        )));

        h.coord.geocoder.fail = true;
        h.coord.handle_command(CoordinatorCommand::Search("lon".into())).await;
        let (query, result) = h.coord.search_rx.recv().await.unwrap();
        h.coord.handle_search_outcome(query, result);
        let notices = notices(&mut h.events);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].scope, NoticeScope::Search);
        assert_eq!(h.coord.store.len(), 0);
    }
}
