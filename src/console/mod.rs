//! Line-oriented terminal front end
//!
//! Reads commands from stdin, forwards them to the coordinator, and prints
//! the coordinator's notices and the status changes worth reporting.

mod commands;
mod host;

pub use commands::{parse_line, print_commands, ConsoleInput, ParseError};
pub use host::{ConsoleCaptureHost, ConsoleMap};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{wrappers::LinesStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::animation::PlaybackPhase;
use crate::coordinator::{
    CoordinatorCommand, CoordinatorEvent, CoordinatorStatus, NoticeLevel, ViewMode,
};
use crate::geo::format_distance;
use crate::geocode::Candidate;

/// What the console remembers between lines
#[derive(Default)]
pub struct ConsoleState {
    last_status: Option<CoordinatorStatus>,
    candidates: Vec<Candidate>,
}

impl ConsoleState {
    /// Resolve a parsed line into the command to send, printing anything local
    pub fn resolve(&self, input: ConsoleInput) -> Option<CoordinatorCommand> {
        match input {
            ConsoleInput::Send(cmd) => Some(cmd),
            ConsoleInput::Pick(n) => match n.checked_sub(1).and_then(|i| self.candidates.get(i)) {
                Some(candidate) => Some(CoordinatorCommand::AddWaypoint(candidate.to_waypoint())),
                None => {
                    println!("No search result #{}", n);
                    None
                }
            },
            ConsoleInput::Remove(n) => {
                let waypoint = self
                    .last_status
                    .as_ref()
                    .zip(n.checked_sub(1))
                    .and_then(|(s, i)| s.waypoints.get(i));
                match waypoint {
                    Some(w) => Some(CoordinatorCommand::RemoveWaypoint(w.id.clone())),
                    None => {
                        println!("No waypoint #{}", n);
                        None
                    }
                }
            }
            ConsoleInput::List => {
                self.print_waypoints();
                None
            }
            ConsoleInput::Help => {
                print_commands();
                // Closing the help panel is remembered across runs
                Some(CoordinatorCommand::DismissHelp)
            }
            ConsoleInput::Quit => Some(CoordinatorCommand::Shutdown),
            ConsoleInput::Empty => None,
        }
    }

    pub fn apply(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Notice(notice) => {
                let tag = match notice.level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Warning => "warning",
                    NoticeLevel::Error => "error",
                };
                println!("[{}] {}", tag, notice.message);
            }
            CoordinatorEvent::SearchResults { query, candidates } => {
                if !candidates.is_empty() {
                    println!("Results for \"{}\":", query);
                    for (i, c) in candidates.iter().enumerate() {
                        println!("  {}. {}", i + 1, c.display_name);
                    }
                }
                self.candidates = candidates;
            }
            CoordinatorEvent::Status(status) => {
                if let Some(previous) = &self.last_status {
                    report_changes(previous, &status);
                } else if status.help_visible {
                    print_commands();
                }
                self.last_status = Some(status);
            }
        }
    }

    fn print_waypoints(&self) {
        let Some(status) = &self.last_status else {
            return;
        };
        if status.waypoints.is_empty() {
            println!("No waypoints yet");
            return;
        }
        for (i, w) in status.waypoints.iter().enumerate() {
            println!("  {}. {} ({:.4}, {:.4})", i + 1, w.name, w.lat, w.lng);
        }
        println!("Total distance: {}", format_distance(status.total_distance_m));
    }
}

fn report_changes(previous: &CoordinatorStatus, status: &CoordinatorStatus) {
    if previous.waypoints.len() != status.waypoints.len() {
        println!(
            "{} waypoints, {}",
            status.waypoints.len(),
            format_distance(status.total_distance_m)
        );
    }
    if previous.view_mode != status.view_mode {
        match status.view_mode {
            ViewMode::Normal => println!("Back to normal view"),
            ViewMode::Recording => println!("Recording..."),
            ViewMode::Preview => println!("Preview (type 'dismiss' to exit)"),
        }
    }
    if previous.playback != status.playback {
        match status.playback {
            PlaybackPhase::SegmentEntering if previous.playback == PlaybackPhase::Idle => {
                println!("Playing")
            }
            PlaybackPhase::Idle if previous.playback != PlaybackPhase::Completed => {
                println!(
                    "Stopped at {}",
                    format_distance(previous.traveled_m.max(status.traveled_m))
                )
            }
            PlaybackPhase::Completed => {
                println!("Arrived after {}", format_distance(status.traveled_m))
            }
            _ => {}
        }
    }
    if previous.summary.is_none() {
        if let Some(summary) = &status.summary {
            println!(
                "Trip: {} ({}, {} countries)",
                summary.waypoint_names.join(" → "),
                format_distance(summary.total_distance_m),
                summary.countries.len()
            );
        }
    }
}

/// Feed stdin lines to the coordinator until quit, EOF or cancellation
pub async fn run_input_loop(
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
    mut events: broadcast::Receiver<CoordinatorEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = LinesStream::new(stdin.lines());
    let mut state = ConsoleState::default();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            line = lines.next() => {
                let Some(line) = line else {
                    debug!("stdin closed");
                    break;
                };
                let input = match parse_line(&line?) {
                    Ok(input) => input,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                let Some(cmd) = state.resolve(input) else {
                    continue;
                };
                if matches!(cmd, CoordinatorCommand::Shutdown) {
                    break;
                }
                if cmd_tx.send(cmd).await.is_err() {
                    warn!("Coordinator stopped, leaving input loop");
                    return Ok(());
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => state.apply(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Console skipped {} coordinator events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    if cmd_tx.send(CoordinatorCommand::Shutdown).await.is_err() {
        debug!("Coordinator already stopped");
    }
    Ok(())
}
