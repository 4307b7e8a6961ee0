//! Geographic helpers used by the waypoint store and the animation engine
//!
//! Coordinates are WGS84 decimal degrees. Interpolation is componentwise
//! linear (not a great-circle slerp), which is close enough for the short
//! segments shown at typical map zoom levels.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned lat/lng bounding region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    /// Smallest region containing every point, or `None` for an empty slice
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a LatLng>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Bounds {
            south_west: first,
            north_east: first,
        };
        for p in iter {
            bounds.extend(*p);
        }
        Some(bounds)
    }

    fn extend(&mut self, p: LatLng) {
        self.south_west.lat = self.south_west.lat.min(p.lat);
        self.south_west.lng = self.south_west.lng.min(p.lng);
        self.north_east.lat = self.north_east.lat.max(p.lat);
        self.north_east.lng = self.north_east.lng.max(p.lng);
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.south_west.lat
            && p.lat <= self.north_east.lat
            && p.lng >= self.south_west.lng
            && p.lng <= self.north_east.lng
    }
}

/// Linear interpolation between `start` and `end`; `t` is clamped to `[0, 1]`
pub fn interpolate(start: LatLng, end: LatLng, t: f64) -> LatLng {
    let t = t.clamp(0.0, 1.0);
    LatLng {
        lat: start.lat + (end.lat - start.lat) * t,
        lng: start.lng + (end.lng - start.lng) * t,
    }
}

/// Initial compass bearing from `start` to `end`, normalized into `[0, 360)`
pub fn bearing(start: LatLng, end: LatLng) -> f64 {
    let phi1 = start.lat.to_radians();
    let phi2 = end.lat.to_radians();
    let delta_lambda = (end.lng - start.lng).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}

/// Great-circle distance in meters (haversine)
pub fn distance(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Sum of consecutive-pair distances; fewer than two points is zero
pub fn path_length(points: &[LatLng]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Human-readable distance readout
pub fn format_distance(meters: f64) -> String {
    let meters = meters.max(0.0);
    if meters < 1000.0 {
        return format!("{} m", meters.round() as u64);
    }
    let km = meters / 1000.0;
    if km < 100.0 {
        return format!("{:.1} km", km);
    }
    format!("{} km", group_thousands(km.round() as u64))
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
