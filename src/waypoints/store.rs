//! In-memory waypoint sequence with a cached total path length

use tracing::debug;

use super::Waypoint;
use crate::geo::{self, LatLng};

/// Ordered list of waypoints. Order is insertion order and defines path direction.
#[derive(Debug, Default, Clone)]
pub struct WaypointStore {
    waypoints: Vec<Waypoint>,
    total_distance_m: f64,
    /// Bumped on every mutation so in-flight playback can detect a stale path
    revision: u64,
}

impl WaypointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a previously persisted sequence
    pub fn from_waypoints(waypoints: Vec<Waypoint>) -> Self {
        let mut store = Self {
            waypoints,
            total_distance_m: 0.0,
            revision: 0,
        };
        store.recompute();
        store
    }

    /// Append a waypoint to the end of the path
    pub fn add(&mut self, waypoint: Waypoint) {
        debug!("Adding waypoint {} ({})", waypoint.name, waypoint.id);
        self.waypoints.push(waypoint);
        self.mutated();
    }

    /// Remove the waypoint with the given id, returning it if present
    pub fn remove(&mut self, id: &str) -> Option<Waypoint> {
        let index = self.waypoints.iter().position(|w| w.id == id)?;
        let removed = self.waypoints.remove(index);
        debug!("Removed waypoint {} ({})", removed.name, removed.id);
        self.mutated();
        Some(removed)
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// A path needs at least two waypoints
    pub fn is_navigable(&self) -> bool {
        self.waypoints.len() >= 2
    }

    pub fn positions(&self) -> Vec<LatLng> {
        self.waypoints.iter().map(Waypoint::position).collect()
    }

    /// Sum of great-circle distances between consecutive waypoints, in meters
    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Distinct country codes in path order
    pub fn countries(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for w in &self.waypoints {
            if !w.country_code.is_empty() && !seen.contains(&w.country_code) {
                seen.push(w.country_code.clone());
            }
        }
        seen
    }

    fn mutated(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.total_distance_m = geo::path_length(&self.positions());
    }
}
