//! Framing and interaction locking on top of a host map

use tracing::{debug, warn};

use super::{InteractionMode, MapSurface};
use crate::config::ViewportConfig;
use crate::geo::{Bounds, LatLng};

/// Which session currently holds the interaction lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOwner {
    Playback,
    CaptureSetup,
}

/// Interaction modes that were enabled right before they were disabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InteractionSnapshot {
    enabled: Vec<InteractionMode>,
}

impl InteractionSnapshot {
    fn capture<M: MapSurface>(map: &M) -> Self {
        Self {
            enabled: InteractionMode::ALL
                .into_iter()
                .filter(|mode| map.interaction_enabled(*mode))
                .collect(),
        }
    }
}

pub struct ViewportController<M> {
    map: M,
    full_path_padding_px: u32,
    segment_padding_px: u32,
    lock: Option<(InteractionOwner, InteractionSnapshot)>,
}

impl<M: MapSurface> ViewportController<M> {
    pub fn new(map: M, config: &ViewportConfig) -> Self {
        Self {
            map,
            full_path_padding_px: config.full_path_padding_px,
            segment_padding_px: config.segment_padding_px,
            lock: None,
        }
    }

    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut M {
        &mut self.map
    }

    pub fn is_ready(&self) -> bool {
        self.map.is_ready()
    }

    /// Fit the whole path in view. Returns false (and does nothing) for fewer than two points.
    pub fn frame_to_full_path(&mut self, points: &[LatLng]) -> bool {
        if points.len() < 2 {
            return false;
        }
        let Some(bounds) = Bounds::from_points(points) else {
            return false;
        };
        debug!("Framing full path ({} points)", points.len());
        self.map.fit_bounds(bounds, self.full_path_padding_px);
        true
    }

    /// Fit exactly the two endpoints of a segment
    pub fn frame_to_segment(&mut self, a: LatLng, b: LatLng) {
        if let Some(bounds) = Bounds::from_points(&[a, b]) {
            debug!("Framing segment {:?} -> {:?}", a, b);
            self.map.fit_bounds(bounds, self.segment_padding_px);
        }
    }

    /// Snapshot the enabled interaction modes and switch them all off.
    ///
    /// Returns false when another owner already holds the lock. Calling it
    /// again as the current owner keeps the original snapshot.
    pub fn disable_user_interaction(&mut self, owner: InteractionOwner) -> bool {
        match &self.lock {
            Some((holder, _)) if *holder == owner => return true,
            Some((holder, _)) => {
                warn!("Interaction lock held by {:?}, refusing {:?}", holder, owner);
                return false;
            }
            None => {}
        }

        let snapshot = InteractionSnapshot::capture(&self.map);
        for mode in InteractionMode::ALL {
            self.map.set_interaction(mode, false);
        }
        debug!("{:?} disabled map interaction (was {:?})", owner, snapshot.enabled);
        self.lock = Some((owner, snapshot));
        true
    }

    /// Re-enable exactly the modes captured by `owner`'s snapshot
    pub fn restore_user_interaction(&mut self, owner: InteractionOwner) -> bool {
        match self.lock.take() {
            Some((holder, snapshot)) if holder == owner => {
                for mode in snapshot.enabled {
                    self.map.set_interaction(mode, true);
                }
                debug!("{:?} restored map interaction", owner);
                true
            }
            other => {
                self.lock = other;
                false
            }
        }
    }

    pub fn interaction_owner(&self) -> Option<InteractionOwner> {
        self.lock.as_ref().map(|(owner, _)| *owner)
    }

    /// Remove the zoom control, returning whether it was present
    pub fn hide_zoom_control(&mut self) -> bool {
        if self.map.has_zoom_control() {
            self.map.remove_zoom_control();
            true
        } else {
            false
        }
    }

    /// Put the zoom control back unless it is already there
    pub fn restore_zoom_control(&mut self) {
        if !self.map.has_zoom_control() {
            self.map.add_zoom_control();
        }
    }
}
