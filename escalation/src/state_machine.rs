//! Escalation cycle state machine: explicit states and legal transition guards.
//!
//! Every cycle starts at `CheckingTunnel` and ends in exactly one
//! `Finished(TerminalState)`. Each terminal state maps to one process exit
//! code so supervisors can tell the outcomes apart.
//!
//! ```text
//! CheckingTunnel  → Finished(Nominal) | CheckingWan
//! CheckingWan     → CheckingDevice | ResolvingTicket
//! CheckingDevice  → Finished(FullyIsolated) | Finished(NoUpstream)
//! ResolvingTicket → Remediating | Finished(TicketingFailed)
//! Remediating     → Finished(DeviceUnresponsive | RemediationFailed | Remediated)
//! any probing state → Finished(ProbeFailed)
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// Tunnel reachable, nothing to do.
    Nominal,
    /// Tunnel, WAN and device all unreachable: host is off the network.
    FullyIsolated,
    /// Device reachable but no WAN: upstream/ISP outage.
    NoUpstream,
    /// Device failed its liveness probe before the session.
    DeviceUnresponsive,
    /// Session or command failed.
    RemediationFailed,
    /// Restart command succeeded.
    Remediated,
    /// The probe transport itself failed.
    ProbeFailed,
    /// The ticketing system could not be reached or refused a request.
    TicketingFailed,
}

impl TerminalState {
    pub const ALL: [TerminalState; 8] = [
        Self::Nominal,
        Self::FullyIsolated,
        Self::NoUpstream,
        Self::DeviceUnresponsive,
        Self::RemediationFailed,
        Self::Remediated,
        Self::ProbeFailed,
        Self::TicketingFailed,
    ];

    /// Process exit code. Stable; supervisory tooling depends on these.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Nominal | Self::Remediated => 0,
            Self::FullyIsolated => 1,
            Self::NoUpstream => 2,
            Self::DeviceUnresponsive => 3,
            Self::RemediationFailed => 4,
            Self::ProbeFailed => 5,
            Self::TicketingFailed => 6,
        }
    }

    /// Whether the cycle ended without an outstanding fault.
    pub fn is_success(self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nominal => write!(f, "Nominal"),
            Self::FullyIsolated => write!(f, "FullyIsolated"),
            Self::NoUpstream => write!(f, "NoUpstream"),
            Self::DeviceUnresponsive => write!(f, "DeviceUnresponsive"),
            Self::RemediationFailed => write!(f, "RemediationFailed"),
            Self::Remediated => write!(f, "Remediated"),
            Self::ProbeFailed => write!(f, "ProbeFailed"),
            Self::TicketingFailed => write!(f, "TicketingFailed"),
        }
    }
}

/// The set of cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Probing the tunnel address.
    CheckingTunnel,
    /// Tunnel down; probing the WAN address.
    CheckingWan,
    /// Tunnel and WAN down; probing the device.
    CheckingDevice,
    /// Tunnel down, WAN up: find or open the incident.
    ResolvingTicket,
    /// Liveness check, then the restart command.
    Remediating,
    /// Terminal.
    Finished(TerminalState),
}

impl CycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished(_))
    }

    pub fn terminal(self) -> Option<TerminalState> {
        match self {
            Self::Finished(t) => Some(t),
            _ => None,
        }
    }

    /// States that run a probe and may therefore end in `ProbeFailed`.
    fn probes(self) -> bool {
        matches!(
            self,
            Self::CheckingTunnel | Self::CheckingWan | Self::CheckingDevice | Self::Remediating
        )
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckingTunnel => write!(f, "CheckingTunnel"),
            Self::CheckingWan => write!(f, "CheckingWan"),
            Self::CheckingDevice => write!(f, "CheckingDevice"),
            Self::ResolvingTicket => write!(f, "ResolvingTicket"),
            Self::Remediating => write!(f, "Remediating"),
            Self::Finished(t) => write!(f, "{}", t),
        }
    }
}

fn is_legal_transition(from: CycleState, to: CycleState) -> bool {
    use CycleState::*;
    use TerminalState::*;

    if to == Finished(ProbeFailed) && from.probes() {
        return true;
    }

    matches!(
        (from, to),
        (CheckingTunnel, Finished(Nominal))
            | (CheckingTunnel, CheckingWan)
            | (CheckingWan, CheckingDevice)
            | (CheckingWan, ResolvingTicket)
            | (CheckingDevice, Finished(FullyIsolated))
            | (CheckingDevice, Finished(NoUpstream))
            | (ResolvingTicket, Remediating)
            | (ResolvingTicket, Finished(TicketingFailed))
            | (Remediating, Finished(DeviceUnresponsive))
            | (Remediating, Finished(RemediationFailed))
            | (Remediating, Finished(Remediated))
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: CycleState,
    pub to: CycleState,
    /// Milliseconds since the cycle started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: CycleState,
    pub to: CycleState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current state of one cycle and the log of transitions.
pub struct StateMachine {
    current: CycleState,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `CheckingTunnel`.
    pub fn new() -> Self {
        Self {
            current: CycleState::CheckingTunnel,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> CycleState {
        self.current
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: CycleState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(from = %self.current, to = %to, "State transition");

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, e.g. `CheckingTunnel → Nominal (3ms, 1 transitions) [Nominal]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        format!(
            "{} → {} ({}ms, {} transitions)",
            CycleState::CheckingTunnel,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        ) + if states.is_empty() {
            String::new()
        } else {
            format!(" [{}]", states.join(" → "))
        }
        .as_str()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
