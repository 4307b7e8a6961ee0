//! Terminal stand-ins for the map and capture hosts

use futures::future::{FutureExt, LocalBoxFuture};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::capture::{
    CaptureError, CaptureEvent, CaptureHost, CaptureSessionId, CaptureSupport, MediaRecorder,
    MediaStream, RecorderOptions,
};
use crate::geo::{Bounds, LatLng};
use crate::viewport::{InteractionMode, MapSurface, MarkerId};

/// Map that keeps its state in memory and logs every operation
pub struct ConsoleMap {
    enabled: HashSet<InteractionMode>,
    markers: HashMap<MarkerId, LatLng>,
    zoom_control: bool,
    next_marker: u64,
}

impl ConsoleMap {
    pub fn new() -> Self {
        Self {
            enabled: InteractionMode::ALL.into_iter().collect(),
            markers: HashMap::new(),
            zoom_control: true,
            next_marker: 1,
        }
    }

    pub fn marker_position(&self, marker: MarkerId) -> Option<LatLng> {
        self.markers.get(&marker).copied()
    }
}

impl Default for ConsoleMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MapSurface for ConsoleMap {
    fn is_ready(&self) -> bool {
        true
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32) {
        info!(
            "map: fit ({:.4}, {:.4}) - ({:.4}, {:.4}) padding {}px",
            bounds.south_west.lat,
            bounds.south_west.lng,
            bounds.north_east.lat,
            bounds.north_east.lng,
            padding_px
        );
    }

    fn interaction_enabled(&self, mode: InteractionMode) -> bool {
        self.enabled.contains(&mode)
    }

    fn set_interaction(&mut self, mode: InteractionMode, enabled: bool) {
        debug!("map: {:?} {}", mode, if enabled { "on" } else { "off" });
        if enabled {
            self.enabled.insert(mode);
        } else {
            self.enabled.remove(&mode);
        }
    }

    fn add_marker(&mut self, position: LatLng, rotation_deg: f64) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        self.markers.insert(id, position);
        info!(
            "map: marker {} at ({:.4}, {:.4}) heading {:.0}°",
            id.0, position.lat, position.lng, rotation_deg
        );
        id
    }

    fn move_marker(&mut self, marker: MarkerId, position: LatLng, rotation_deg: f64) {
        if let Some(entry) = self.markers.get_mut(&marker) {
            *entry = position;
        }
        debug!(
            "map: marker {} -> ({:.4}, {:.4}) heading {:.0}°",
            marker.0, position.lat, position.lng, rotation_deg
        );
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.markers.remove(&marker);
        info!("map: marker {} removed", marker.0);
    }

    fn has_zoom_control(&self) -> bool {
        self.zoom_control
    }

    fn add_zoom_control(&mut self) {
        self.zoom_control = true;
        debug!("map: zoom control shown");
    }

    fn remove_zoom_control(&mut self) {
        self.zoom_control = false;
        debug!("map: zoom control hidden");
    }
}

/// A terminal has no screen to share
pub struct ConsoleCaptureHost;

/// Uninhabited: the console host never produces a stream
pub enum NoStream {}

/// Uninhabited: the console host never produces a recorder
pub enum NoRecorder {}

impl MediaStream for NoStream {
    fn stop_tracks(&mut self) {
        match *self {}
    }

    fn watch_ended(&mut self, _session: CaptureSessionId, _events: mpsc::UnboundedSender<CaptureEvent>) {
        match *self {}
    }
}

impl MediaRecorder for NoRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        match *self {}
    }

    fn stop(&mut self) {
        match *self {}
    }

    fn is_recording(&self) -> bool {
        match *self {}
    }
}

const NO_CAPTURE_REASON: &str = "terminal session has no display capture";

impl CaptureHost for ConsoleCaptureHost {
    type Stream = NoStream;
    type Recorder = NoRecorder;

    fn support(&self) -> CaptureSupport {
        CaptureSupport::Unsupported(NO_CAPTURE_REASON.to_string())
    }

    fn request_stream(&mut self) -> LocalBoxFuture<'_, Result<NoStream, CaptureError>> {
        futures::future::ready(Err(CaptureError::Unsupported(NO_CAPTURE_REASON.to_string())))
            .boxed_local()
    }

    fn create_recorder(
        &mut self,
        stream: &NoStream,
        _options: &RecorderOptions,
        _session: CaptureSessionId,
        _events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<NoRecorder, CaptureError> {
        match *stream {}
    }
}
