//! Location search
//!
//! Free-text lookups are delegated to a geocoding service. Failures are
//! reported to the user next to the search box and never touch waypoint or
//! playback state.

mod nominatim;

pub use nominatim::NominatimGeocoder;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::waypoints::Waypoint;

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Provider's identifier for the place
    pub place_id: String,
    pub name: String,
    pub display_name: String,
    pub lat: f64,
    pub lng: f64,
    pub country_code: String,
}

impl Candidate {
    /// New waypoint for this place. Ids are fresh so the same place can appear twice in a path.
    pub fn to_waypoint(&self) -> Waypoint {
        Waypoint::new(self.name.clone(), self.lat, self.lng, self.country_code.clone())
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("search query is empty")]
    EmptyQuery,

    #[error("location lookup failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("location service returned status {0}")]
    Status(u16),

    #[error("unexpected location service response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl GeocodeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            GeocodeError::EmptyQuery => "Type a place name to search.",
            GeocodeError::Network(_) | GeocodeError::Status(_) | GeocodeError::Parse(_) => {
                "Location search failed. Check your connection and try again."
            }
        }
    }
}

/// A location search backend
pub trait Geocoder: Send + Sync + 'static {
    fn search(&self, query: &str) -> BoxFuture<'static, Result<Vec<Candidate>, GeocodeError>>;
}
