//! Incident model and the ticket store seam
//!
//! The ticketing system owns incidents; this side only holds a view fetched
//! per decision. Whether an incident is open is derived from its status ID
//! against a fixed set of closed-status identifiers.

use crate::error::TicketError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Ticket identifier in the external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status reference as reported by the ticketing system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStatus {
    pub id: u32,
    #[serde(default)]
    pub name: String,
}

/// Cached view of an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: TicketId,
    pub status: TicketStatus,
}

impl Incident {
    pub fn is_open(&self, closed: &ClosedStatuses) -> bool {
        !closed.contains(self.status.id)
    }
}

/// Status IDs that represent terminal/closed tickets. Anything else is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClosedStatuses(BTreeSet<u32>);

impl ClosedStatuses {
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn contains(&self, status_id: u32) -> bool {
        self.0.contains(&status_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ClosedStatuses {
    /// Completed / QA reviewed / closed-no-response statuses on the service board.
    fn default() -> Self {
        Self::new([736, 612, 452, 737, 739, 778, 17, 80, 9])
    }
}

/// Fixed classification used when opening a new incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTemplate {
    pub summary: String,
    #[serde(default = "default_record_type")]
    pub record_type: String,
    pub contact: u32,
    pub board: u32,
    pub status: u32,
    pub company: u32,
    #[serde(rename = "type")]
    pub ticket_type: u32,
    pub sub_type: u32,
    pub item: u32,
    pub priority: u32,
}

fn default_record_type() -> String {
    "ServiceTicket".to_string()
}

/// Narrow interface to the external ticketing system.
///
/// All calls are synchronous and never retried. `get_incident` returns
/// `Ok(None)` when the ticket does not exist, which is distinct from a
/// transport error.
#[cfg_attr(test, automock)]
pub trait TicketStore {
    fn get_incident(&self, id: TicketId) -> Result<Option<Incident>, TicketError>;

    fn create_incident(&self, template: &IncidentTemplate) -> Result<Incident, TicketError>;

    fn annotate(&self, id: TicketId, note: &str) -> Result<(), TicketError>;
}

impl<T: TicketStore + ?Sized> TicketStore for &T {
    fn get_incident(&self, id: TicketId) -> Result<Option<Incident>, TicketError> {
        (**self).get_incident(id)
    }

    fn create_incident(&self, template: &IncidentTemplate) -> Result<Incident, TicketError> {
        (**self).create_incident(template)
    }

    fn annotate(&self, id: TicketId, note: &str) -> Result<(), TicketError> {
        (**self).annotate(id, note)
    }
}
