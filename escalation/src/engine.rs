//! Escalation Engine: one deterministic pass over the fault ladder
//!
//! Sequences probes across the tunnel, WAN and device addresses, resolves the
//! incident ticket when the fault is actionable, and issues the restart
//! command. Every step is blocking; nothing is retried within a cycle.
//!
//! ```text
//! Tunnel ──up──▶ Nominal
//!   │down
//!   ▼
//! WAN ──up──▶ Ticket (reuse | create) ──▶ Device liveness ──▶ restart command
//!   │down                                    │down               ├─ ok  ▶ Remediated
//!   ▼                                        ▼                   └─ err ▶ RemediationFailed
//! Device ─up─▶ NoUpstream             DeviceUnresponsive
//!   │down
//!   ▼
//! FullyIsolated
//! ```

use crate::address::{Address, Targets};
use crate::error::{EscalationResult, ProbeError};
use crate::event_log::EventLog;
use crate::incident_state::IncidentStateStore;
use crate::probe::{ProbeSettings, ProbeTransport, Prober};
use crate::remediation::{RemediationPlan, RemoteShell};
use crate::resolution::{ResolvedTicket, TicketAction, TicketPolicy, TicketResolver};
use crate::state_machine::{CycleState, StateMachine, TerminalState, TransitionRecord};
use crate::ticket::{TicketId, TicketStore};
use serde::Serialize;
use tracing::{error, info, warn};

/// Static inputs for the engine. Built once at startup.
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    pub targets: Targets,
    /// Burst used for the tunnel, WAN and device checks
    pub probe: ProbeSettings,
    /// Short burst used right before opening the remote session
    pub liveness: ProbeSettings,
    pub tickets: TicketPolicy,
    pub remediation: RemediationPlan,
}

/// Result of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub terminal: TerminalState,
    pub exit_code: u8,
    pub ticket: Option<ResolvedTicket>,
    pub transitions: Vec<TransitionRecord>,
    pub summary: String,
}

struct Step {
    next: CycleState,
    reason: String,
}

impl Step {
    fn to(next: CycleState, reason: impl Into<String>) -> Self {
        Self {
            next,
            reason: reason.into(),
        }
    }

    fn finish(terminal: TerminalState, reason: impl Into<String>) -> Self {
        Self::to(CycleState::Finished(terminal), reason)
    }
}

/// The escalation engine, generic over its three external collaborators.
pub struct EscalationEngine<P, T, R> {
    config: EscalationConfig,
    prober: Prober<P>,
    tickets: T,
    shell: R,
    log: EventLog,
    state: IncidentStateStore,
}

impl<P, T, R> EscalationEngine<P, T, R>
where
    P: ProbeTransport,
    T: TicketStore,
    R: RemoteShell,
{
    pub fn new(
        config: EscalationConfig,
        transport: P,
        tickets: T,
        shell: R,
        log: EventLog,
        state: IncidentStateStore,
    ) -> Self {
        Self {
            config,
            prober: Prober::new(transport),
            tickets,
            shell,
            log,
            state,
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Run one full cycle and report its terminal state.
    pub fn run_cycle(&self) -> EscalationResult<CycleOutcome> {
        let mut machine = StateMachine::new();
        let mut ticket: Option<ResolvedTicket> = None;

        let terminal = loop {
            let step = match machine.current() {
                CycleState::CheckingTunnel => self.check_tunnel(),
                CycleState::CheckingWan => self.check_wan(),
                CycleState::CheckingDevice => self.check_device(),
                CycleState::ResolvingTicket => self.resolve_ticket(&mut ticket),
                CycleState::Remediating => self.remediate(ticket.map(|t| t.id)),
                CycleState::Finished(terminal) => break terminal,
            };
            machine.advance(step.next, Some(&step.reason))?;
        };

        let summary = machine.summary();
        info!(
            state = %terminal,
            exit_code = terminal.exit_code(),
            "Cycle finished: {summary}"
        );

        Ok(CycleOutcome {
            terminal,
            exit_code: terminal.exit_code(),
            ticket,
            transitions: machine.transitions().to_vec(),
            summary,
        })
    }

    fn check_tunnel(&self) -> Step {
        let tunnel = &self.config.targets.tunnel;
        match self.prober.probe(tunnel, &self.config.probe, &self.log) {
            Err(e) => self.probe_failed(tunnel, e),
            Ok(v) if v.is_reachable() => {
                self.log
                    .note(format!("{} is reachable. No action needed.", tunnel));
                Step::finish(TerminalState::Nominal, "tunnel reachable")
            }
            Ok(_) => {
                self.log.note(format!(
                    "{} is unreachable. Testing {}",
                    tunnel, self.config.targets.wan.host
                ));
                Step::to(CycleState::CheckingWan, "tunnel unreachable")
            }
        }
    }

    fn check_wan(&self) -> Step {
        let wan = &self.config.targets.wan;
        match self.prober.probe(wan, &self.config.probe, &self.log) {
            Err(e) => self.probe_failed(wan, e),
            Ok(v) if v.is_reachable() => {
                self.log.note(format!(
                    "{} is reachable. Checking for an open ticket and restarting the tunnel...",
                    wan
                ));
                Step::to(CycleState::ResolvingTicket, "WAN reachable, tunnel down")
            }
            Ok(_) => {
                self.log.note(format!(
                    "{} is also unreachable. Testing {}",
                    wan, self.config.targets.device.host
                ));
                Step::to(CycleState::CheckingDevice, "WAN unreachable")
            }
        }
    }

    fn check_device(&self) -> Step {
        let device = &self.config.targets.device;
        match self.prober.probe(device, &self.config.probe, &self.log) {
            Err(e) => self.probe_failed(device, e),
            Ok(v) if v.is_reachable() => {
                warn!(host = %device.host, "No upstream connectivity");
                self.log.note(format!(
                    "{} is reachable. Host is connected to network with no WAN connection.",
                    device
                ));
                Step::finish(TerminalState::NoUpstream, "device reachable, WAN down")
            }
            Ok(_) => {
                warn!(host = %device.host, "Host appears disconnected");
                self.log.note(format!(
                    "{} is unreachable. Host is most likely disconnected from the network.",
                    device
                ));
                Step::finish(TerminalState::FullyIsolated, "all addresses unreachable")
            }
        }
    }

    fn resolve_ticket(&self, slot: &mut Option<ResolvedTicket>) -> Step {
        let resolver = TicketResolver::new(
            &self.tickets,
            &self.config.tickets,
            &self.log,
            &self.state,
        );

        match resolver.resolve() {
            Ok(resolved) => {
                *slot = Some(resolved);
                let reason = match resolved.action {
                    TicketAction::Reused => format!("reusing ticket {}", resolved.id),
                    TicketAction::Created { .. } => format!("created ticket {}", resolved.id),
                };
                Step::to(CycleState::Remediating, reason)
            }
            Err(e) => {
                error!("Ticket handling failed: {e}");
                self.log.note(format!(
                    "Ticket handling failed: {}. Aborting cycle without remediation.",
                    e
                ));
                Step::finish(TerminalState::TicketingFailed, e.to_string())
            }
        }
    }

    fn remediate(&self, ticket: Option<TicketId>) -> Step {
        let device = &self.config.targets.device;

        match self
            .prober
            .probe(device, &self.config.liveness, &self.log)
        {
            Err(e) => return self.probe_failed(device, e),
            Ok(v) if !v.is_reachable() => {
                warn!(host = %device.host, "Device failed liveness probe");
                self.log.note(format!(
                    "{} is unresponsive before attempting remote session",
                    device
                ));
                return Step::finish(TerminalState::DeviceUnresponsive, "device failed liveness");
            }
            Ok(_) => {}
        }

        let plan = &self.config.remediation;
        self.log
            .note(format!("Attempting remote session to {}", device.host));
        info!(host = %device.host, command = %plan.command, "Running remediation command");

        match self.shell.execute(device, &plan.credentials, &plan.command) {
            Ok(output) => {
                let output = output.trim();
                if !output.is_empty() {
                    self.log.note(format!("Command output: {}", output));
                }
                self.log
                    .note(format!("Command ran successfully on {}", device));
                self.annotate_best_effort(ticket, &self.config.tickets.notes.remediated);
                Step::finish(TerminalState::Remediated, "restart command succeeded")
            }
            Err(e) => {
                error!(host = %device.host, "Remediation failed: {e}");
                self.log
                    .note(format!("Failed to run command on {}: {}", device, e));
                self.annotate_best_effort(
                    ticket,
                    &self.config.tickets.notes.remediation_failed,
                );
                Step::finish(TerminalState::RemediationFailed, e.to_string())
            }
        }
    }

    fn probe_failed(&self, address: &Address, e: ProbeError) -> Step {
        error!(role = %address.role, host = %address.host, "Probe transport failed: {e}");
        self.log
            .note(format!("Probe of {} failed: {}. Aborting cycle.", address, e));
        Step::finish(TerminalState::ProbeFailed, e.to_string())
    }

    /// The remediation outcome stands regardless of whether the note lands.
    fn annotate_best_effort(&self, ticket: Option<TicketId>, note: &str) {
        let Some(id) = ticket else { return };
        if let Err(e) = self.tickets.annotate(id, note) {
            error!(ticket = %id, "Failed to annotate ticket: {e}");
            self.log
                .note(format!("Failed to add note to ticket {}: {}", id, e));
        }
    }
}
