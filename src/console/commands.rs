//! Line command parsing

use thiserror::Error;

use crate::coordinator::CoordinatorCommand;
use crate::waypoints::Waypoint;

/// One parsed input line
#[derive(Debug, Clone)]
pub enum ConsoleInput {
    /// Forwarded as is
    Send(CoordinatorCommand),
    /// Add the n-th candidate (1-based) of the last search
    Pick(usize),
    /// Remove the n-th waypoint (1-based)
    Remove(usize),
    List,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid number '{0}'")]
    Number(String),
}

pub fn parse_line(line: &str) -> Result<ConsoleInput, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "" => ConsoleInput::Empty,
        "add" => ConsoleInput::Send(CoordinatorCommand::AddWaypoint(parse_waypoint(rest)?)),
        "search" | "find" => {
            if rest.is_empty() {
                return Err(ParseError::Usage("search <place>"));
            }
            ConsoleInput::Send(CoordinatorCommand::Search(rest.to_string()))
        }
        "pick" => ConsoleInput::Pick(parse_index(rest, "pick <n>")?),
        "remove" | "rm" => ConsoleInput::Remove(parse_index(rest, "remove <n>")?),
        "list" | "ls" => ConsoleInput::List,
        "play" => ConsoleInput::Send(CoordinatorCommand::StartAnimation),
        "stop" => ConsoleInput::Send(CoordinatorCommand::StopAnimation),
        "record" => ConsoleInput::Send(CoordinatorCommand::StartRecording),
        "stop-record" => ConsoleInput::Send(CoordinatorCommand::StopRecording),
        "preview" => ConsoleInput::Send(CoordinatorCommand::EnterPreview),
        "dismiss" => ConsoleInput::Send(CoordinatorCommand::DismissSummary),
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(input)
}

/// `<name...> <lat> <lng> [country-code]`
fn parse_waypoint(rest: &str) -> Result<Waypoint, ParseError> {
    const USAGE: &str = "add <name> <lat> <lng> [country-code]";
    let mut parts: Vec<&str> = rest.split_whitespace().collect();

    let country_code = match parts.last() {
        Some(last) if last.len() == 2 && last.chars().all(|c| c.is_ascii_alphabetic()) => {
            let cc = last.to_string();
            parts.pop();
            cc
        }
        _ => String::new(),
    };
    if parts.len() < 3 {
        return Err(ParseError::Usage(USAGE));
    }

    let lng_text = parts.pop().unwrap_or_default();
    let lat_text = parts.pop().unwrap_or_default();
    let lat: f64 = lat_text
        .parse()
        .map_err(|_| ParseError::Number(lat_text.to_string()))?;
    let lng: f64 = lng_text
        .parse()
        .map_err(|_| ParseError::Number(lng_text.to_string()))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(ParseError::Usage(USAGE));
    }

    Ok(Waypoint::new(parts.join(" "), lat, lng, country_code))
}

fn parse_index(rest: &str, usage: &'static str) -> Result<usize, ParseError> {
    if rest.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    match rest.parse::<usize>() {
        Ok(0) | Err(_) => Err(ParseError::Number(rest.to_string())),
        Ok(n) => Ok(n),
    }
}

pub fn print_commands() {
    println!("Commands:");
    println!("    add <name> <lat> <lng> [cc]   Add a waypoint");
    println!("    search <place>               Look up a place");
    println!("    pick <n>                     Add the n-th search result");
    println!("    remove <n>                   Remove the n-th waypoint");
    println!("    list                         Show waypoints and distance");
    println!("    play | stop                  Start or stop the animation");
    println!("    preview                      Play fullscreen without recording");
    println!("    record | stop-record         Record the animation");
    println!("    dismiss                      Close the summary");
    println!("    help                         Show this list");
    println!("    quit                         Exit");
}
