//! Local incident record
//!
//! Small JSON file holding the last ticket this agent opened and the status it
//! had when last seen. It is the primary dedup pointer; the event log scan is
//! consulted when no record exists (logs written by older runs) or when the
//! log names a newer ticket than the record.

use crate::error::EventLogError;
use crate::ticket::{Incident, TicketId, TicketStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Last known incident pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub ticket_id: TicketId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_status: Option<TicketStatus>,
    pub recorded_at: DateTime<Utc>,
}

impl IncidentRecord {
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            ticket_id: incident.id,
            last_known_status: Some(incident.status.clone()),
            recorded_at: Utc::now(),
        }
    }
}

/// File-backed store for the [`IncidentRecord`].
#[derive(Debug, Clone)]
pub struct IncidentStateStore {
    path: PathBuf,
}

impl IncidentStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record. A missing, unreadable or corrupt file is treated as
    /// "no record" so dedup falls back to the log scan.
    pub fn load(&self) -> Option<IncidentRecord> {
        if !self.path.exists() {
            return None;
        }

        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) => {
                warn!(path = %self.path.display(), "Incident record unreadable: {e}");
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.path.display(), "Incident record corrupt, ignoring: {e}");
                None
            }
        }
    }

    /// Replace the record. Written to a sibling temp file first, then renamed.
    pub fn save(&self, record: &IncidentRecord) -> Result<(), EventLogError> {
        let json = serde_json::to_string_pretty(record).map_err(|source| EventLogError::Encode {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|source| EventLogError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| EventLogError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Remove the record. A record that cannot be brought up to date must not
    /// keep pointing at an older incident.
    pub fn clear(&self) -> Result<(), EventLogError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EventLogError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
