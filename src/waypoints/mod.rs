//! Ordered waypoint list and its local persistence

mod store;
mod storage;

pub use storage::{LocalStore, HELP_SEEN_KEY, WAYPOINTS_KEY};
pub use store::WaypointStore;

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// A named point on the planned path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Opaque unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Two-letter country code, used for flag iconography
    #[serde(default)]
    pub country_code: String,
}

impl Waypoint {
    /// Create a waypoint with a freshly generated id
    pub fn new(name: impl Into<String>, lat: f64, lng: f64, country_code: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            lat,
            lng,
            country_code: country_code.into().to_lowercase(),
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}
