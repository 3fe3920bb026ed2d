//! Tunnel Escalation Library
//!
//! Decision core for an unattended VPN tunnel watchdog:
//! - Fault localization across tunnel, WAN and device addresses
//! - Incident dedup against a ticketing system, keyed by the last ticket this agent opened
//! - A single remediation attempt over a remote session
//! - An append-only, human-readable event log
//!
//! The external collaborators (echo transport, ticketing system, remote
//! shell) are traits; the `tunnel-agent` binary supplies the real ones.
//!
//! # Usage
//!
//! ```ignore
//! let engine = EscalationEngine::new(config, ping, manage, ssh, log, state);
//! let outcome = engine.run_cycle()?;
//! std::process::exit(outcome.exit_code as i32);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod address;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod incident_state;
pub mod probe;
pub mod remediation;
pub mod resolution;
pub mod state_machine;
pub mod ticket;

pub use address::{Address, AddressRole, Targets};
pub use engine::{CycleOutcome, EscalationConfig, EscalationEngine};
pub use error::{
    EscalationError, EscalationResult, EventLogError, ProbeError, RemediationError, TicketError,
};
pub use event_log::{EventLog, LogEntry, TicketMarker};
pub use incident_state::{IncidentRecord, IncidentStateStore};
pub use probe::{classify, ProbeResult, ProbeSettings, ProbeTransport, Prober, Reachability};
pub use remediation::{Credentials, RemediationPlan, RemoteShell};
pub use resolution::{
    IncidentNotes, KnownTicket, PointerSource, ResolvedTicket, TicketAction, TicketPolicy,
    TicketResolver,
};
pub use state_machine::{CycleState, StateMachine, TerminalState, TransitionRecord};
pub use ticket::{ClosedStatuses, Incident, IncidentTemplate, TicketId, TicketStatus, TicketStore};
