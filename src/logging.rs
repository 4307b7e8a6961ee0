//! Log file setup
//!
//! The terminal belongs to the console front end, so events go to a daily
//! rolling file (and os_log on macOS). Level and retention come from the
//! `[logging]` config section; `RUST_LOG` still wins over the level.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Rotated files are named `flightpath.log.YYYY-MM-DD`
const LOG_FILE_PREFIX: &str = "flightpath.log";
const LOG_DIR_ENV: &str = "FLIGHTPATH_LOG_PATH";
const FALLBACK_LEVEL: &str = "info";

#[cfg(target_os = "macos")]
const OSLOG_SUBSYSTEM: &str = "dev.flightpath.app";

/// Directory the log files go to, honoring `FLIGHTPATH_LOG_PATH`
pub fn log_directory(config: &LoggingConfig) -> Result<PathBuf> {
    let env_override = std::env::var_os(LOG_DIR_ENV).map(PathBuf::from);
    resolve_log_dir(env_override, config)
}

/// Install the global subscriber and prune expired files.
///
/// The returned guard flushes buffered lines when dropped.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let log_dir = log_directory(config)?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(&config.level));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    #[cfg(target_os = "macos")]
    let registry = registry.with(tracing_oslog::OsLogger::new(OSLOG_SUBSYSTEM, "default"));
    registry
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(retention) = config.retention() {
        let removed = prune_expired_logs(&log_dir, retention, SystemTime::now());
        if removed > 0 {
            info!("Removed {} expired log files from {:?}", removed, log_dir);
        }
    }

    Ok(guard)
}

fn resolve_log_dir(env_override: Option<PathBuf>, config: &LoggingConfig) -> Result<PathBuf> {
    if let Some(dir) = env_override.or_else(|| config.directory.clone()) {
        return Ok(dir);
    }

    let proj_dirs = ProjectDirs::from("dev", "flightpath", "flightpath")
        .context("Failed to determine project directories for log path")?;
    let base = proj_dirs
        .state_dir()
        .unwrap_or_else(|| proj_dirs.data_local_dir());
    Ok(base.join("logs"))
}

/// Parse configured directives, falling back to `info` when they are malformed
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Ignoring log level {:?}: {}", level, e);
        EnvFilter::new(FALLBACK_LEVEL)
    })
}

fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
}

/// Delete log files last written before `now - retention`. Returns how many went.
fn prune_expired_logs(log_dir: &Path, retention: Duration, now: SystemTime) -> usize {
    let Some(cutoff) = now.checked_sub(retention) else {
        return 0;
    };
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {:?} for pruning: {}", log_dir, e);
            return 0;
        }
    };

    let expired: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| matches!(entry.metadata().and_then(|m| m.modified()), Ok(t) if t < cutoff))
        .map(|entry| entry.path())
        .filter(|path| is_log_file(path))
        .collect();

    expired
        .iter()
        .filter(|path| match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to remove old log {:?}: {}", path, e);
                false
            }
        })
        .count()
}
