//! Marker playback along the waypoint path
//!
//! The engine is frame-driven: the caller owns the redraw clock and hands
//! each tick to [`AnimationEngine::on_frame`]. Nothing here schedules time.

mod engine;

pub use engine::AnimationEngine;

use crate::geo::LatLng;

/// Playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    /// Segment timer unset; the next frame reframes the viewport
    SegmentEntering,
    SegmentPlaying,
    /// Path finished; marker left at the final waypoint
    Completed,
}

/// What one frame did
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub segment_index: usize,
    /// Always within `[0, 1]`
    pub progress: f64,
    pub position: LatLng,
    /// Marker heading for the whole segment
    pub bearing_deg: f64,
    /// Distance moved since the previous frame, only when strictly positive
    pub distance_delta_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No playback session is running
    Inactive,
    Advanced(FrameReport),
    /// Last segment reached. Emitted exactly once per session.
    Completed(FrameReport),
    /// Session was torn down on this frame (stale path or missing marker)
    Aborted,
}
