//! Durable, append-only event log
//!
//! Plain text, one line per event: `YYYY/MM/DD HH:MM:SS <message>`. The file
//! is opened, appended and closed on every write so external readers only ever
//! see complete lines. The only machine-read line is the ticket-created
//! marker, used as a fallback pointer to the last opened incident.

use crate::error::EventLogError;
use crate::ticket::TicketId;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::warn;

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
const TIMESTAMP_LEN: usize = 19;

/// Matches a line whose message is the ticket-created marker.
static TICKET_CREATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2} )?Ticket created with ID: (\d+)")
        .expect("TICKET_CREATED_RE regex should compile")
});

/// Message written when a new incident is opened.
pub fn ticket_created_message(id: TicketId) -> String {
    format!("Ticket created with ID: {}", id)
}

/// A single parsed log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    /// Embedded line breaks are flattened so one entry is always one line.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into().replace(['\r', '\n'], " "),
        }
    }

    pub fn to_log_line(&self) -> String {
        format!("{} {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }

    /// Parse a line written by [`LogEntry::to_log_line`]. Lines without a
    /// readable timestamp prefix yield `None`.
    pub fn from_log_line(line: &str) -> Option<Self> {
        let stamp = line.get(..TIMESTAMP_LEN)?;
        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        let message = line.get(TIMESTAMP_LEN..)?.trim_start().to_string();
        Some(Self { timestamp, message })
    }
}

/// The most recent ticket-created line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketMarker {
    pub id: TicketId,
    /// `None` for lines without a readable timestamp prefix
    pub logged_at: Option<DateTime<Utc>>,
}

/// Handle on the log file. Holds only the path, never an open descriptor.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one message as a single line.
    pub fn append(&self, message: impl Into<String>) -> Result<(), EventLogError> {
        let entry = LogEntry::new(message);
        let mut line = entry.to_log_line();
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        // One write call per line keeps appends whole.
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Append an audit line, reporting a write failure through tracing
    /// instead of returning it.
    pub fn note(&self, message: impl Into<String>) {
        if let Err(e) = self.append(message) {
            warn!("Event log write failed: {e}");
        }
    }

    /// Read every line that parses as an entry. Missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<LogEntry>, EventLogError> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| LogEntry::from_log_line(line))
            .collect())
    }

    /// Scan for the most recent ticket-created marker.
    pub fn find_last_ticket_id(&self) -> Result<Option<TicketId>, EventLogError> {
        Ok(self.find_last_ticket_marker()?.map(|m| m.id))
    }

    /// Like [`EventLog::find_last_ticket_id`], keeping the line's timestamp.
    pub fn find_last_ticket_marker(&self) -> Result<Option<TicketMarker>, EventLogError> {
        let found = self.read_lines()?.iter().rev().find_map(|line| {
            let id = TICKET_CREATED_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())?;
            Some(TicketMarker {
                id: TicketId(id),
                logged_at: LogEntry::from_log_line(line).map(|e| e.timestamp),
            })
        });
        Ok(found)
    }

    /// Lines that are not valid UTF-8 are decoded lossily; they never end the scan.
    fn read_lines(&self) -> Result<Vec<String>, EventLogError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        Ok(bytes
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).trim_end_matches('\r').to_string())
            .collect())
    }

    fn io_error(&self, source: std::io::Error) -> EventLogError {
        EventLogError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
