//! Integration tests for the escalation cycle
//!
//! Drives full cycles against in-memory fakes of the ticketing system, echo
//! transport and remote shell, with a real event log and incident record on
//! disk, across consecutive runs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use tunnel_escalation::{
    ClosedStatuses, Credentials, EscalationConfig, EscalationEngine, EventLog, Incident,
    IncidentNotes, IncidentStateStore, IncidentTemplate, ProbeError, ProbeResult, ProbeSettings,
    ProbeTransport, RemediationError, RemediationPlan, RemoteShell, Address, TerminalState,
    TicketAction, TicketError, TicketId, TicketPolicy, TicketStatus, TicketStore, Targets,
};

const TUNNEL: &str = "10.8.0.1";
const WAN: &str = "8.8.8.8";
const DEVICE: &str = "192.168.10.1";

/// Echo transport with a fixed per-host answer.
struct FakeNetwork {
    up: HashMap<&'static str, bool>,
    runs: RefCell<Vec<(String, u32)>>,
}

impl FakeNetwork {
    fn new(tunnel: bool, wan: bool, device: bool) -> Self {
        Self {
            up: HashMap::from([(TUNNEL, tunnel), (WAN, wan), (DEVICE, device)]),
            runs: RefCell::new(Vec::new()),
        }
    }
}

impl ProbeTransport for FakeNetwork {
    fn run(&self, host: &str, settings: &ProbeSettings) -> Result<ProbeResult, ProbeError> {
        self.runs
            .borrow_mut()
            .push((host.to_string(), settings.count));
        let up = self.up.get(host).copied().unwrap_or(false);
        let received = if up { settings.count } else { 0 };
        let rtt = if up {
            Duration::from_millis(9)
        } else {
            Duration::ZERO
        };
        Ok(ProbeResult::from_counts(settings.count, received, rtt))
    }
}

/// In-memory ticketing system.
#[derive(Default)]
struct FakeTickets {
    incidents: RefCell<HashMap<u64, u32>>,
    next_id: Cell<u64>,
    creates: Cell<u32>,
    notes: RefCell<Vec<(TicketId, String)>>,
}

impl FakeTickets {
    fn starting_at(id: u64) -> Self {
        let t = Self::default();
        t.next_id.set(id);
        t
    }

    fn close(&self, id: u64) {
        self.incidents.borrow_mut().insert(id, 452);
    }
}

impl TicketStore for FakeTickets {
    fn get_incident(&self, id: TicketId) -> Result<Option<Incident>, TicketError> {
        Ok(self.incidents.borrow().get(&id.0).map(|status| Incident {
            id,
            status: TicketStatus {
                id: *status,
                name: String::new(),
            },
        }))
    }

    fn create_incident(&self, template: &IncidentTemplate) -> Result<Incident, TicketError> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.creates.set(self.creates.get() + 1);
        self.incidents.borrow_mut().insert(id, template.status);
        Ok(Incident {
            id: TicketId(id),
            status: TicketStatus {
                id: template.status,
                name: "New".into(),
            },
        })
    }

    fn annotate(&self, id: TicketId, note: &str) -> Result<(), TicketError> {
        self.notes.borrow_mut().push((id, note.to_string()));
        Ok(())
    }
}

/// Remote shell that records each command and answers with a fixed result.
struct FakeShell {
    fail: bool,
    commands: RefCell<Vec<(String, String)>>,
}

impl FakeShell {
    fn ok() -> Self {
        Self {
            fail: false,
            commands: RefCell::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            commands: RefCell::new(Vec::new()),
        }
    }
}

impl RemoteShell for FakeShell {
    fn execute(
        &self,
        address: &Address,
        _credentials: &Credentials,
        command: &str,
    ) -> Result<String, RemediationError> {
        self.commands
            .borrow_mut()
            .push((address.host.clone(), command.to_string()));
        if self.fail {
            Err(RemediationError::CommandFailed {
                command: command.to_string(),
                status: 1,
                output: "ipsec: not running".into(),
            })
        } else {
            Ok("Stopping strongSwan IPsec...\nStarting strongSwan IPsec...".into())
        }
    }
}

fn config() -> EscalationConfig {
    EscalationConfig {
        targets: Targets::new(TUNNEL, WAN, DEVICE),
        probe: ProbeSettings::standard(),
        liveness: ProbeSettings::liveness(),
        tickets: TicketPolicy {
            template: IncidentTemplate {
                summary: "SCRIPT TICKET - TCT VPN Tunnel Down".into(),
                record_type: "ServiceTicket".into(),
                contact: 1694,
                board: 1,
                status: 579,
                company: 19786,
                ticket_type: 193,
                sub_type: 7,
                item: 57,
                priority: 6,
            },
            closed_statuses: ClosedStatuses::default(),
            notes: IncidentNotes::default(),
        },
        remediation: RemediationPlan::new(Credentials::new("admin", "pw"), "ipsec restart"),
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    log: EventLog,
    state: IncidentStateStore,
}

fn workspace() -> Workspace {
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let log = EventLog::new(dir.path().join("pingo.log"));
    let state = IncidentStateStore::new(dir.path().join("incident.json"));
    Workspace {
        _dir: dir,
        log,
        state,
    }
}

fn created_lines(log: &EventLog) -> usize {
    log.read_all()
        .unwrap()
        .iter()
        .filter(|e| e.message.starts_with("Ticket created with ID: "))
        .count()
}

/// Test: tunnel down with WAN up opens one ticket, logs it and restarts once
#[test]
fn test_first_outage_creates_ticket_and_restarts() {
    let ws = workspace();
    let net = FakeNetwork::new(false, true, true);
    let tickets = FakeTickets::starting_at(4521);
    let shell = FakeShell::ok();

    let engine = EscalationEngine::new(
        config(),
        &net,
        &tickets,
        &shell,
        ws.log.clone(),
        ws.state.clone(),
    );
    let outcome = engine.run_cycle().unwrap();

    assert_eq!(outcome.terminal, TerminalState::Remediated);
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(tickets.creates.get(), 1);
    assert_eq!(created_lines(&ws.log), 1);
    assert_eq!(ws.log.find_last_ticket_id().unwrap(), Some(TicketId(4521)));
    assert_eq!(
        shell.commands.borrow().as_slice(),
        &[(DEVICE.to_string(), "ipsec restart".to_string())]
    );

    // Liveness burst precedes the session
    let runs = net.runs.borrow();
    assert_eq!(runs.last().unwrap(), &(DEVICE.to_string(), 2));
}

/// Test: a persisting outage reuses the open ticket on every later cycle
#[test]
fn test_persisting_outage_never_duplicates_ticket() {
    let ws = workspace();
    let net = FakeNetwork::new(false, true, true);
    let tickets = FakeTickets::starting_at(100);
    let shell = FakeShell::failing();

    for _ in 0..3 {
        let engine = EscalationEngine::new(
            config(),
            &net,
            &tickets,
            &shell,
            ws.log.clone(),
            ws.state.clone(),
        );
        let outcome = engine.run_cycle().unwrap();
        assert_eq!(outcome.terminal, TerminalState::RemediationFailed);
        assert_eq!(outcome.ticket.unwrap().id, TicketId(100));
    }

    assert_eq!(tickets.creates.get(), 1);
    assert_eq!(created_lines(&ws.log), 1);
    assert_eq!(shell.commands.borrow().len(), 3);

    let outage_notes = tickets
        .notes
        .borrow()
        .iter()
        .filter(|(_, n)| *n == IncidentNotes::default().outage)
        .count();
    assert_eq!(outage_notes, 3);
}

/// Test: a ticket closed by a human between runs is replaced, not reopened
#[test]
fn test_closed_ticket_is_superseded_on_next_outage() {
    let ws = workspace();
    let net = FakeNetwork::new(false, true, true);
    let tickets = FakeTickets::starting_at(7000);
    let shell = FakeShell::ok();

    let run = || {
        EscalationEngine::new(
            config(),
            &net,
            &tickets,
            &shell,
            ws.log.clone(),
            ws.state.clone(),
        )
        .run_cycle()
        .unwrap()
    };

    let first = run();
    assert_eq!(first.ticket.unwrap().id, TicketId(7000));

    tickets.close(7000);

    let second = run();
    let ticket = second.ticket.unwrap();
    assert_eq!(ticket.id, TicketId(7001));
    assert_eq!(
        ticket.action,
        TicketAction::Created {
            superseded: Some(TicketId(7000))
        }
    );
    assert_eq!(tickets.creates.get(), 2);
    assert_eq!(ws.log.find_last_ticket_id().unwrap(), Some(TicketId(7001)));
}

/// Test: only the event log survives (record deleted); dedup still holds
#[test]
fn test_log_scan_recovers_ticket_without_record() {
    let ws = workspace();
    let net = FakeNetwork::new(false, true, true);
    let tickets = FakeTickets::starting_at(55);
    let shell = FakeShell::ok();

    EscalationEngine::new(
        config(),
        &net,
        &tickets,
        &shell,
        ws.log.clone(),
        ws.state.clone(),
    )
    .run_cycle()
    .unwrap();

    std::fs::remove_file(ws.state.path()).unwrap();

    let outcome = EscalationEngine::new(
        config(),
        &net,
        &tickets,
        &shell,
        ws.log.clone(),
        ws.state.clone(),
    )
    .run_cycle()
    .unwrap();

    assert_eq!(outcome.ticket.unwrap().action, TicketAction::Reused);
    assert_eq!(tickets.creates.get(), 1);
}

/// Test: the fault matrix never touches tickets or the device unless the WAN is up
#[test]
fn test_fault_matrix_side_effects() {
    let cases = [
        (true, true, true, TerminalState::Nominal),
        (true, false, false, TerminalState::Nominal),
        (false, false, false, TerminalState::FullyIsolated),
        (false, false, true, TerminalState::NoUpstream),
    ];

    for (tunnel, wan, device, expected) in cases {
        let ws = workspace();
        let net = FakeNetwork::new(tunnel, wan, device);
        let tickets = FakeTickets::starting_at(1);
        let shell = FakeShell::ok();

        let outcome = EscalationEngine::new(
            config(),
            &net,
            &tickets,
            &shell,
            ws.log.clone(),
            ws.state.clone(),
        )
        .run_cycle()
        .unwrap();

        assert_eq!(outcome.terminal, expected, "case {:?}", (tunnel, wan, device));
        assert_eq!(tickets.creates.get(), 0);
        assert!(tickets.notes.borrow().is_empty());
        assert!(shell.commands.borrow().is_empty());
        assert!(ws.state.load().is_none());
    }
}

/// Test: device that drops off between fault localization and the session
#[test]
fn test_unresponsive_device_keeps_ticket_but_skips_session() {
    let ws = workspace();
    let tickets = FakeTickets::starting_at(900);
    let shell = FakeShell::ok();

    // Device never answers; WAN does
    let net = FakeNetwork::new(false, true, false);
    let outcome = EscalationEngine::new(
        config(),
        &net,
        &tickets,
        &shell,
        ws.log.clone(),
        ws.state.clone(),
    )
    .run_cycle()
    .unwrap();

    assert_eq!(outcome.terminal, TerminalState::DeviceUnresponsive);
    assert_eq!(outcome.exit_code, 3);
    assert_eq!(tickets.creates.get(), 1);
    assert!(shell.commands.borrow().is_empty());

    let lines = ws.log.read_all().unwrap();
    assert!(lines
        .iter()
        .any(|e| e.message.contains("unresponsive before attempting remote session")));
}
