//! Recording fakes for the host seams, shared by unit tests

use futures::future::{BoxFuture, FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::capture::{
    CaptureError, CaptureEvent, CaptureHost, CaptureSessionId, CaptureSupport, MediaRecorder,
    MediaStream, RecorderOptions,
};
use crate::geo::{Bounds, LatLng};
use crate::geocode::{Candidate, GeocodeError, Geocoder};
use crate::viewport::{InteractionMode, MapSurface, MarkerId};

#[derive(Debug, Clone, PartialEq)]
pub enum MapCall {
    FitBounds(Bounds, u32),
    SetInteraction(InteractionMode, bool),
    AddMarker(MarkerId),
    MoveMarker(MarkerId),
    RemoveMarker(MarkerId),
    AddZoomControl,
    RemoveZoomControl,
}

pub struct FakeMap {
    pub ready: bool,
    pub calls: Vec<MapCall>,
    pub markers: HashMap<MarkerId, (LatLng, f64)>,
    interactions: HashMap<InteractionMode, bool>,
    zoom_control: bool,
    next_marker: u64,
}

impl FakeMap {
    /// Ready map with every interaction enabled and a zoom control
    pub fn new() -> Self {
        Self {
            ready: true,
            calls: Vec::new(),
            markers: HashMap::new(),
            interactions: InteractionMode::ALL.into_iter().map(|m| (m, true)).collect(),
            zoom_control: true,
            next_marker: 1,
        }
    }

    pub fn fits(&self) -> Vec<(Bounds, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                MapCall::FitBounds(b, p) => Some((*b, *p)),
                _ => None,
            })
            .collect()
    }
}

impl MapSurface for FakeMap {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding_px: u32) {
        self.calls.push(MapCall::FitBounds(bounds, padding_px));
    }

    fn interaction_enabled(&self, mode: InteractionMode) -> bool {
        self.interactions.get(&mode).copied().unwrap_or(false)
    }

    fn set_interaction(&mut self, mode: InteractionMode, enabled: bool) {
        self.interactions.insert(mode, enabled);
        self.calls.push(MapCall::SetInteraction(mode, enabled));
    }

    fn add_marker(&mut self, position: LatLng, rotation_deg: f64) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        self.markers.insert(id, (position, rotation_deg));
        self.calls.push(MapCall::AddMarker(id));
        id
    }

    fn move_marker(&mut self, marker: MarkerId, position: LatLng, rotation_deg: f64) {
        if let Some(entry) = self.markers.get_mut(&marker) {
            *entry = (position, rotation_deg);
        }
        self.calls.push(MapCall::MoveMarker(marker));
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.markers.remove(&marker);
        self.calls.push(MapCall::RemoveMarker(marker));
    }

    fn has_zoom_control(&self) -> bool {
        self.zoom_control
    }

    fn add_zoom_control(&mut self) {
        self.zoom_control = true;
        self.calls.push(MapCall::AddZoomControl);
    }

    fn remove_zoom_control(&mut self) {
        self.zoom_control = false;
        self.calls.push(MapCall::RemoveZoomControl);
    }
}

/// Counters shared between a fake host and the handles it hands out
#[derive(Debug, Default)]
pub struct CaptureLog {
    pub stream_requests: usize,
    pub streams_acquired: usize,
    pub streams_released: usize,
    pub recorders_created: usize,
    pub recorders_started: usize,
    pub recorders_stopped: usize,
    pub recorders_dropped: usize,
    ended_watchers: Vec<(CaptureSessionId, mpsc::UnboundedSender<CaptureEvent>)>,
}

pub struct FakeCaptureHost {
    log: Rc<RefCell<CaptureLog>>,
    support: CaptureSupport,
    deny_with: Option<CaptureError>,
    fail_recorder_start: bool,
}

impl FakeCaptureHost {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(CaptureLog::default())),
            support: CaptureSupport::Supported,
            deny_with: None,
            fail_recorder_start: false,
        }
    }

    pub fn denying(mut self, error: CaptureError) -> Self {
        self.deny_with = Some(error);
        self
    }

    pub fn with_support(mut self, support: CaptureSupport) -> Self {
        self.support = support;
        self
    }

    pub fn failing_recorder_start(mut self) -> Self {
        self.fail_recorder_start = true;
        self
    }

    pub fn log(&self) -> Rc<RefCell<CaptureLog>> {
        self.log.clone()
    }
}

/// Simulate the user revoking capture from the host UI
pub fn end_stream(log: &Rc<RefCell<CaptureLog>>, session: CaptureSessionId) {
    for (watched, tx) in &log.borrow().ended_watchers {
        if *watched == session {
            let _ = tx.send(CaptureEvent::StreamEnded { session });
        }
    }
}

pub struct FakeStream {
    log: Rc<RefCell<CaptureLog>>,
    active: bool,
}

impl MediaStream for FakeStream {
    fn stop_tracks(&mut self) {
        if self.active {
            self.active = false;
            self.log.borrow_mut().streams_released += 1;
        }
    }

    fn watch_ended(&mut self, session: CaptureSessionId, events: mpsc::UnboundedSender<CaptureEvent>) {
        self.log.borrow_mut().ended_watchers.push((session, events));
    }
}

pub struct FakeRecorder {
    log: Rc<RefCell<CaptureLog>>,
    session: CaptureSessionId,
    events: mpsc::UnboundedSender<CaptureEvent>,
    recording: bool,
    fail_start: bool,
}

impl MediaRecorder for FakeRecorder {
    fn start(&mut self) -> Result<(), CaptureError> {
        if self.fail_start {
            return Err(CaptureError::Recorder("encoder unavailable".into()));
        }
        self.recording = true;
        self.log.borrow_mut().recorders_started += 1;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.recording {
            return;
        }
        self.recording = false;
        self.log.borrow_mut().recorders_stopped += 1;
        let _ = self.events.send(CaptureEvent::DataAvailable {
            session: self.session,
            chunk: b"webm-cluster".to_vec(),
        });
        let _ = self.events.send(CaptureEvent::RecorderStopped {
            session: self.session,
        });
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}

impl Drop for FakeRecorder {
    fn drop(&mut self) {
        self.log.borrow_mut().recorders_dropped += 1;
    }
}

impl CaptureHost for FakeCaptureHost {
    type Stream = FakeStream;
    type Recorder = FakeRecorder;

    fn support(&self) -> CaptureSupport {
        self.support.clone()
    }

    fn request_stream(&mut self) -> LocalBoxFuture<'_, Result<FakeStream, CaptureError>> {
        let log = self.log.clone();
        let deny = self.deny_with.clone();
        async move {
            log.borrow_mut().stream_requests += 1;
            tokio::task::yield_now().await;
            if let Some(error) = deny {
                return Err(error);
            }
            log.borrow_mut().streams_acquired += 1;
            Ok(FakeStream { log, active: true })
        }
        .boxed_local()
    }

    fn create_recorder(
        &mut self,
        _stream: &FakeStream,
        _options: &RecorderOptions,
        session: CaptureSessionId,
        events: mpsc::UnboundedSender<CaptureEvent>,
    ) -> Result<FakeRecorder, CaptureError> {
        self.log.borrow_mut().recorders_created += 1;
        Ok(FakeRecorder {
            log: self.log.clone(),
            session,
            events,
            recording: false,
            fail_start: self.fail_recorder_start,
        })
    }
}

/// Geocoder answering from a fixed table
#[derive(Clone, Default)]
pub struct FakeGeocoder {
    pub places: Arc<Mutex<Vec<Candidate>>>,
    pub fail: bool,
}

impl Geocoder for FakeGeocoder {
    fn search(&self, query: &str) -> BoxFuture<'static, Result<Vec<Candidate>, GeocodeError>> {
        let query = query.trim().to_lowercase();
        let result = if query.is_empty() {
            Err(GeocodeError::EmptyQuery)
        } else if self.fail {
            Err(GeocodeError::Status(503))
        } else {
            let places = self.places.lock().map(|p| p.clone()).unwrap_or_default();
            Ok(places
                .into_iter()
                .filter(|c| c.name.to_lowercase().contains(&query))
                .collect())
        };
        futures::future::ready(result).boxed()
    }
}

pub fn candidate(name: &str, lat: f64, lng: f64, country_code: &str) -> Candidate {
    Candidate {
        place_id: name.to_lowercase(),
        name: name.to_string(),
        display_name: name.to_string(),
        lat,
        lng,
        country_code: country_code.to_string(),
    }
}
