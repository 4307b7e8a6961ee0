//! flightpath
//!
//! Plots an ordered list of waypoints on a map, animates a marker along the
//! resulting path, and records the playback as a video through the host's
//! screen-capture facility.

pub mod animation;
pub mod capture;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod geo;
pub mod geocode;
pub mod logging;
pub mod viewport;
pub mod waypoints;

#[cfg(test)]
mod testing;
