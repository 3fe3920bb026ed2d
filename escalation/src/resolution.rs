//! Ticket resolution: reuse the open incident or open a fresh one
//!
//! ```text
//! last known ticket?
//!   none                         → create, record, annotate
//!   some → get_incident
//!            open                → annotate (never a second incident)
//!            closed | not found  → create, record, annotate
//!            malformed response  → create, record, annotate
//!            transport / status  → error, no ticket ID fabricated
//! ```
//!
//! The live status check guards against a human closing the ticket between
//! runs. The read-decide-write sequence is not atomic; overlapping cycles
//! must be prevented by the scheduler.

use crate::error::TicketError;
use crate::event_log::{ticket_created_message, EventLog};
use crate::incident_state::{IncidentRecord, IncidentStateStore};
use crate::ticket::{ClosedStatuses, Incident, IncidentTemplate, TicketId, TicketStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Notes attached to the incident at each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentNotes {
    /// Added when the outage is (re)detected
    pub outage: String,
    /// Added after a successful restart
    pub remediated: String,
    /// Added when the restart could not be applied
    pub remediation_failed: String,
}

impl Default for IncidentNotes {
    fn default() -> Self {
        Self {
            outage: "Tunnel is down. Host is attempting to restart the tunnel.".to_string(),
            remediated: "Tunnel was restarted successfully.".to_string(),
            remediation_failed:
                "Automated tunnel restart failed. Manual intervention required.".to_string(),
        }
    }
}

/// Everything the resolver needs to know about the ticketing side.
#[derive(Debug, Clone)]
pub struct TicketPolicy {
    pub template: IncidentTemplate,
    pub closed_statuses: ClosedStatuses,
    pub notes: IncidentNotes,
}

/// Whether the incident was reused or newly opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    Reused,
    Created {
        /// Previously known ticket that was closed, missing or unreadable
        superseded: Option<TicketId>,
    },
}

/// Incident associated with the current outage episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTicket {
    pub id: TicketId,
    pub action: TicketAction,
}

/// Where the last known ticket pointer was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSource {
    IncidentRecord,
    EventLog,
}

impl fmt::Display for PointerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncidentRecord => write!(f, "incident record"),
            Self::EventLog => write!(f, "log"),
        }
    }
}

/// Pointer to the last incident this agent opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownTicket {
    pub id: TicketId,
    pub source: PointerSource,
}

/// Applies the dedup rule against a [`TicketStore`].
pub struct TicketResolver<'a, T> {
    store: &'a T,
    policy: &'a TicketPolicy,
    log: &'a EventLog,
    state: &'a IncidentStateStore,
}

impl<'a, T: TicketStore> TicketResolver<'a, T> {
    pub fn new(
        store: &'a T,
        policy: &'a TicketPolicy,
        log: &'a EventLog,
        state: &'a IncidentStateStore,
    ) -> Self {
        Self {
            store,
            policy,
            log,
            state,
        }
    }

    /// Pointer to the last incident this agent opened. The local record wins
    /// unless the log holds a marker for a different ticket written after it.
    pub fn last_known_ticket(&self) -> Option<KnownTicket> {
        let record = self.state.load();
        let marker = match self.log.find_last_ticket_marker() {
            Ok(marker) => marker,
            Err(e) => {
                warn!("Event log unreadable, relying on incident record: {e}");
                None
            }
        };

        let from_log = |id| KnownTicket {
            id,
            source: PointerSource::EventLog,
        };

        match (record, marker) {
            (Some(record), Some(marker))
                if marker.id != record.ticket_id
                    && marker.logged_at.is_some_and(|t| t > record.recorded_at) =>
            {
                warn!(
                    record = %record.ticket_id,
                    logged = %marker.id,
                    "Incident record is older than the last logged ticket"
                );
                Some(from_log(marker.id))
            }
            (Some(record), _) => Some(KnownTicket {
                id: record.ticket_id,
                source: PointerSource::IncidentRecord,
            }),
            (None, Some(marker)) => Some(from_log(marker.id)),
            (None, None) => None,
        }
    }

    /// Find or open the incident for the current outage and annotate it.
    pub fn resolve(&self) -> Result<ResolvedTicket, TicketError> {
        let superseded = match self.last_known_ticket() {
            None => None,
            Some(known) => {
                self.log.note(format!(
                    "Ticket {} present in {}. Checking its validity via its status ID...",
                    known.id, known.source
                ));
                match self.check_existing(known.id)? {
                    Some(incident) => return self.reuse(incident),
                    None => Some(known.id),
                }
            }
        };

        self.open_new(superseded)
    }

    /// Returns the incident if it is still open.
    fn check_existing(&self, id: TicketId) -> Result<Option<Incident>, TicketError> {
        match self.store.get_incident(id) {
            Ok(Some(incident)) => {
                self.log.note(format!(
                    "Ticket {} status: {} (ID: {})",
                    id, incident.status.name, incident.status.id
                ));
                if incident.is_open(&self.policy.closed_statuses) {
                    Ok(Some(incident))
                } else {
                    self.log.note(format!(
                        "Ticket {} is not active. Creating a new ticket.",
                        id
                    ));
                    Ok(None)
                }
            }
            Ok(None) => {
                self.log.note(format!(
                    "Ticket {} not found in ticketing system. Creating a new ticket.",
                    id
                ));
                Ok(None)
            }
            Err(e) if e.is_data_error() => {
                warn!(ticket = %id, "Unreadable ticket response, treating as closed: {e}");
                self.log.note(format!(
                    "Ticket {} status could not be read ({}). Creating a new ticket.",
                    id, e
                ));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn reuse(&self, incident: Incident) -> Result<ResolvedTicket, TicketError> {
        info!(ticket = %incident.id, "Reusing open ticket");
        self.log.note(format!(
            "Ticket {} is a valid ticket. Adding a note.",
            incident.id
        ));
        self.store.annotate(incident.id, &self.policy.notes.outage)?;
        self.record(&incident);

        Ok(ResolvedTicket {
            id: incident.id,
            action: TicketAction::Reused,
        })
    }

    fn open_new(&self, superseded: Option<TicketId>) -> Result<ResolvedTicket, TicketError> {
        let incident = self.store.create_incident(&self.policy.template)?;
        info!(ticket = %incident.id, "Created ticket");

        if let Err(e) = self.log.append(ticket_created_message(incident.id)) {
            error!(ticket = %incident.id, "Failed to log created ticket: {e}");
        }
        self.record(&incident);

        self.store.annotate(incident.id, &self.policy.notes.outage)?;

        Ok(ResolvedTicket {
            id: incident.id,
            action: TicketAction::Created { superseded },
        })
    }

    fn record(&self, incident: &Incident) {
        let Err(e) = self.state.save(&IncidentRecord::from_incident(incident)) else {
            return;
        };
        error!(ticket = %incident.id, "Failed to save incident record: {e}");

        if let Err(e) = self.state.clear() {
            error!(ticket = %incident.id, "Failed to remove stale incident record: {e}");
        }
    }
}
