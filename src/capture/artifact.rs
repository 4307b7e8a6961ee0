//! Finished recording output

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

/// Concatenated recorder output, ready to hand to the user as-is
#[derive(Debug, Clone)]
pub struct VideoArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Local>,
}

/// An artifact written to the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub size_bytes: usize,
}

impl VideoArtifact {
    /// Join recorder chunks in arrival order
    pub fn from_chunks(
        prefix: &str,
        mime_type: &str,
        chunks: Vec<Vec<u8>>,
        created_at: DateTime<Local>,
    ) -> Self {
        let bytes = chunks.concat();
        let file_name = format!(
            "{}-{}.{}",
            prefix,
            created_at.format("%Y-%m-%d-%H-%M-%S"),
            extension_for(mime_type)
        );
        Self {
            file_name,
            mime_type: mime_type.to_string(),
            bytes,
            created_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the artifact into `dir`, creating it if needed
    pub async fn save_to(&self, dir: &Path) -> Result<SavedArtifact> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.bytes)
            .await
            .with_context(|| format!("Failed to write recording: {:?}", path))?;

        info!(
            "Saved recording {:?} ({:.2} MB)",
            path,
            self.bytes.len() as f64 / (1024.0 * 1024.0)
        );
        Ok(SavedArtifact {
            path,
            size_bytes: self.bytes.len(),
        })
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    let container = mime_type.split(';').next().unwrap_or_default().trim();
    match container {
        "video/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        _ => "webm",
    }
}
