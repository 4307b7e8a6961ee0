//! Presentation coordinator - ties user intent to playback, capture and overlays

mod engine;
mod setup;

pub use engine::{create_coordinator_channels, Coordinator};
pub use setup::SetupStep;

use std::path::PathBuf;

use crate::animation::PlaybackPhase;
use crate::capture::CaptureSupport;
use crate::geocode::Candidate;
use crate::waypoints::Waypoint;

/// Commands that can be sent to the coordinator
#[derive(Debug, Clone)]
pub enum CoordinatorCommand {
    AddWaypoint(Waypoint),
    /// Remove by waypoint id
    RemoveWaypoint(String),
    /// Free-text location search; results arrive as [`CoordinatorEvent::SearchResults`]
    Search(String),
    StartAnimation,
    StopAnimation,
    StartRecording,
    StopRecording,
    /// Hide the chrome and play without recording
    EnterPreview,
    /// Tap on the summary / exit control
    DismissSummary,
    DismissHelp,
    Shutdown,
}

/// Top-level presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Normal,
    /// Capture running; summary auto-stops the recording
    Recording,
    /// Chrome hidden without recording; summary waits for a tap
    Preview,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripSummary {
    pub waypoint_names: Vec<String>,
    pub total_distance_m: f64,
    /// Distinct country codes in path order
    pub countries: Vec<String>,
}

/// Snapshot of everything the UI renders
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorStatus {
    pub view_mode: ViewMode,
    pub playback: PlaybackPhase,
    pub recording: bool,
    pub chrome_hidden: bool,
    /// Exit button shown while previewing
    pub exit_control_visible: bool,
    pub summary: Option<TripSummary>,
    pub help_visible: bool,
    pub waypoints: Vec<Waypoint>,
    pub total_distance_m: f64,
    /// Traveled distance readout, never above `total_distance_m`
    pub traveled_m: f64,
    pub capture_support: CaptureSupport,
    pub last_recording: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Where a notice belongs in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeScope {
    General,
    /// Inline next to the search box
    Search,
    Capture,
}

/// User-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub scope: NoticeScope,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, scope: NoticeScope, message: impl Into<String>) -> Self {
        Self {
            level,
            scope,
            message: message.into(),
        }
    }
}

/// Updates broadcast by the coordinator
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Status(CoordinatorStatus),
    Notice(Notice),
    SearchResults {
        query: String,
        candidates: Vec<Candidate>,
    },
}
