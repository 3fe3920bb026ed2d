//! Tunnel agent CLI
//!
//! Runs one escalation cycle and exits with the code of its terminal state.
//! Meant to be invoked by cron or a systemd timer; overlap prevention is the
//! scheduler's job.
//!
//! # Usage
//!
//! ```bash
//! tunnel-agent --config /etc/tunnel-agent.toml
//! tunnel-agent --config ./tunnel-agent.toml --check-config
//! RUST_LOG=tunnel_escalation=debug tunnel-agent
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tunnel_agent::{AgentConfig, ManageClient, SshRemoteShell, SystemPing};
use tunnel_escalation::{EscalationEngine, EventLog, IncidentStateStore};

/// Configuration or startup failure (sysexits EX_CONFIG)
const EXIT_CONFIG: u8 = 78;
/// Internal invariant violation (sysexits EX_SOFTWARE)
const EXIT_SOFTWARE: u8 = 70;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the agent configuration file
    #[arg(long, default_value = "tunnel-agent.toml")]
    config: PathBuf,

    /// Event log path (overrides paths.event_log)
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// Incident record path (overrides paths.incident_state)
    #[arg(long)]
    incident_state: Option<PathBuf>,

    /// Validate the configuration and exit without probing
    #[arg(long, default_value_t = false)]
    check_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("tunnel_agent=info,tunnel_escalation=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if args.check_config {
        info!(path = %args.config.display(), "Configuration OK");
        return ExitCode::SUCCESS;
    }

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match engine.run_cycle() {
        Ok(outcome) => {
            info!(
                state = %outcome.terminal,
                ticket = ?outcome.ticket.map(|t| t.id.0),
                "{}",
                outcome.summary
            );
            ExitCode::from(outcome.exit_code)
        }
        Err(e) => {
            error!("Escalation cycle aborted: {e}");
            engine
                .event_log()
                .note(format!("Cycle aborted by internal error: {}", e));
            ExitCode::from(EXIT_SOFTWARE)
        }
    }
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = AgentConfig::load(&args.config)?;
    if let Some(path) = &args.event_log {
        config.paths.event_log = path.clone();
    }
    if let Some(path) = &args.incident_state {
        config.paths.incident_state = path.clone();
    }
    Ok(config)
}

type AgentEngine = EscalationEngine<SystemPing, ManageClient, SshRemoteShell>;

fn build_engine(config: &AgentConfig) -> Result<AgentEngine> {
    let manage = ManageClient::new(&config.manage).context("Failed to set up Manage client")?;

    Ok(EscalationEngine::new(
        config.escalation_config(),
        SystemPing::new(),
        manage,
        SshRemoteShell::from_config(&config.device),
        EventLog::new(&config.paths.event_log),
        IncidentStateStore::new(&config.paths.incident_state),
    ))
}
