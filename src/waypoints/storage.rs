//! Key-value persistence for the waypoint list and first-run help flag
//!
//! Each key is a file under the data directory. Reads never fail startup:
//! missing or unparseable data degrades to the empty default.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, warn};

use super::Waypoint;

/// Key holding the JSON-encoded waypoint sequence
pub const WAYPOINTS_KEY: &str = "flightpath.waypoints";
/// Key set once the first-run help overlay has been dismissed
pub const HELP_SEEN_KEY: &str = "flightpath.help-seen";

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.key_path(key)).ok()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data directory: {:?}", self.root))?;
        let path = self.key_path(key);
        std::fs::write(&path, value).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    pub fn load_waypoints(&self) -> Vec<Waypoint> {
        let Some(raw) = self.get(WAYPOINTS_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<Waypoint>>(&raw) {
            Ok(waypoints) => {
                debug!("Loaded {} stored waypoints", waypoints.len());
                waypoints
            }
            Err(e) => {
                warn!("Stored waypoints are unreadable, starting empty: {}", e);
                Vec::new()
            }
        }
    }

    pub fn save_waypoints(&self, waypoints: &[Waypoint]) -> Result<()> {
        let json = serde_json::to_string(waypoints).context("Failed to serialize waypoints")?;
        self.set(WAYPOINTS_KEY, &json)
    }

    pub fn help_seen(&self) -> bool {
        self.get(HELP_SEEN_KEY).map(|v| v.trim() == "true").unwrap_or(false)
    }

    pub fn mark_help_seen(&self) -> Result<()> {
        self.set(HELP_SEEN_KEY, "true")
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}
