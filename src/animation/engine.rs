//! Playback session and per-frame interpolation

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{FrameOutcome, FrameReport, PlaybackPhase};
use crate::config::AnimationConfig;
use crate::geo::{self, LatLng};
use crate::viewport::{InteractionOwner, MapSurface, MarkerId, ViewportController};
use crate::waypoints::WaypointStore;

/// Ephemeral state of one playback run. Dropped as a whole on any exit to Idle.
#[derive(Debug)]
struct PlaybackSession {
    /// Path snapshot taken at start
    path: Vec<LatLng>,
    /// Store revision the snapshot belongs to
    path_revision: u64,
    segment_index: usize,
    segment_started_at: Option<Instant>,
    last_position: LatLng,
    traveled_m: f64,
    marker: Option<MarkerId>,
    completed: bool,
}

impl PlaybackSession {
    fn segment_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    fn segment(&self) -> (LatLng, LatLng) {
        (self.path[self.segment_index], self.path[self.segment_index + 1])
    }
}

pub struct AnimationEngine {
    segment_duration: Duration,
    session: Option<PlaybackSession>,
}

impl AnimationEngine {
    pub fn new(config: &AnimationConfig) -> Self {
        Self {
            segment_duration: config.segment_duration(),
            session: None,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        match &self.session {
            None => PlaybackPhase::Idle,
            Some(s) if s.completed => PlaybackPhase::Completed,
            Some(s) if s.segment_started_at.is_none() => PlaybackPhase::SegmentEntering,
            Some(_) => PlaybackPhase::SegmentPlaying,
        }
    }

    /// True while frames should be requested
    pub fn is_playing(&self) -> bool {
        matches!(
            self.phase(),
            PlaybackPhase::SegmentEntering | PlaybackPhase::SegmentPlaying
        )
    }

    /// Raw cumulative distance of the current session, unclamped
    pub fn traveled_m(&self) -> f64 {
        self.session.as_ref().map(|s| s.traveled_m).unwrap_or(0.0)
    }

    pub fn segment_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.segment_index)
    }

    /// Begin playback from the first waypoint.
    ///
    /// No-op (returns false) with fewer than two waypoints or while a session
    /// is already playing. A completed session is torn down first.
    pub fn start<M: MapSurface>(
        &mut self,
        store: &WaypointStore,
        viewport: &mut ViewportController<M>,
    ) -> bool {
        if !store.is_navigable() {
            debug!("Playback needs at least two waypoints ({} present)", store.len());
            return false;
        }
        if self.is_playing() {
            debug!("Playback already running");
            return false;
        }
        self.stop(viewport);

        if !viewport.disable_user_interaction(InteractionOwner::Playback) {
            return false;
        }

        let path = store.positions();
        let rotation = geo::bearing(path[0], path[1]);
        let marker = viewport.map_mut().add_marker(path[0], rotation);

        info!(
            "Playback started: {} segments, {:.1} km",
            path.len() - 1,
            store.total_distance_m() / 1000.0
        );

        self.session = Some(PlaybackSession {
            last_position: path[0],
            path,
            path_revision: store.revision(),
            segment_index: 0,
            segment_started_at: None,
            traveled_m: 0.0,
            marker: Some(marker),
            completed: false,
        });
        true
    }

    /// Advance playback to `now`.
    ///
    /// `store_revision` is the waypoint store's current revision; a mismatch
    /// means the path changed under the session and playback ends here.
    pub fn on_frame<M: MapSurface>(
        &mut self,
        now: Instant,
        store_revision: u64,
        viewport: &mut ViewportController<M>,
    ) -> FrameOutcome {
        let Some(session) = self.session.as_mut() else {
            return FrameOutcome::Inactive;
        };
        if session.completed {
            return FrameOutcome::Inactive;
        }
        if session.path_revision != store_revision {
            debug!("Waypoints changed during playback, stopping");
            self.stop(viewport);
            return FrameOutcome::Aborted;
        }
        let Some(marker) = session.marker else {
            error!("Playback frame without a marker, stopping");
            self.stop(viewport);
            return FrameOutcome::Aborted;
        };

        let (from, to) = session.segment();
        let started_at = match session.segment_started_at {
            Some(t) => t,
            None => {
                viewport.frame_to_segment(from, to);
                session.segment_started_at = Some(now);
                now
            }
        };

        let elapsed = now.saturating_duration_since(started_at);
        let progress = (elapsed.as_secs_f64() / self.segment_duration.as_secs_f64()).clamp(0.0, 1.0);
        let position = geo::interpolate(from, to, progress);
        let bearing_deg = geo::bearing(from, to);
        viewport.map_mut().move_marker(marker, position, bearing_deg);

        let step = geo::distance(session.last_position, position);
        let distance_delta_m = if step > 0.0 {
            session.traveled_m += step;
            Some(step)
        } else {
            None
        };
        session.last_position = position;

        let report = FrameReport {
            segment_index: session.segment_index,
            progress,
            position,
            bearing_deg,
            distance_delta_m,
        };

        if progress < 1.0 {
            return FrameOutcome::Advanced(report);
        }

        if session.segment_index + 1 < session.segment_count() {
            session.segment_index += 1;
            session.segment_started_at = None;
            debug!("Entering segment {}", session.segment_index);
            return FrameOutcome::Advanced(report);
        }

        session.completed = true;
        info!("Playback completed after {:.1} km", session.traveled_m / 1000.0);
        viewport.frame_to_full_path(&session.path);
        FrameOutcome::Completed(report)
    }

    /// Return to Idle: remove the marker, restore interaction, drop the session
    pub fn stop<M: MapSurface>(&mut self, viewport: &mut ViewportController<M>) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        if let Some(marker) = session.marker {
            viewport.map_mut().remove_marker(marker);
        }
        viewport.restore_user_interaction(InteractionOwner::Playback);
        debug!("Playback session cleared");
        true
    }
}
