//! Reachability transport backed by the system `ping` binary.
//!
//! Raw ICMP sockets need privileges the agent should not hold, so each burst
//! shells out to `ping -n -c <count> -i <interval> -w <deadline> <host>` and
//! parses the summary lines.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;
use tunnel_escalation::{ProbeError, ProbeResult, ProbeSettings, ProbeTransport};

/// `5 packets transmitted, 3 received` (iputils) or `3 packets received` (busybox)
static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received")
        .expect("SUMMARY_RE regex should compile")
});

/// `rtt min/avg/max/mdev = 0.045/0.061/0.081/0.012 ms`
static RTT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"min/avg/max\S* = [\d.]+/[\d.]+/([\d.]+)").expect("RTT_RE regex should compile")
});

/// ping exit status for "ran, but some hosts did not reply"
const EXIT_NO_REPLY: i32 = 1;
/// ping exit status for errors, including a missing route
const EXIT_ERROR: i32 = 2;

/// Errors on exit 2 that mean "no path to the host" rather than a broken probe.
const ROUTE_ERRORS: [&str; 2] = ["Network is unreachable", "No route to host"];

#[derive(Debug, Clone)]
pub struct SystemPing {
    program: String,
}

impl SystemPing {
    pub fn new() -> Self {
        Self::with_program("ping")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(host: &str, settings: &ProbeSettings) -> Vec<String> {
        vec![
            "-n".into(),
            "-c".into(),
            settings.count.to_string(),
            "-i".into(),
            format!("{}", settings.interval.as_secs_f64()),
            "-w".into(),
            settings.timeout.as_secs().max(1).to_string(),
            host.into(),
        ]
    }
}

impl Default for SystemPing {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeTransport for SystemPing {
    fn run(&self, host: &str, settings: &ProbeSettings) -> Result<ProbeResult, ProbeError> {
        let output = Command::new(&self.program)
            .args(Self::args(host, settings))
            .output()
            .map_err(|e| ProbeError::Unavailable {
                host: host.to_string(),
                message: format!("Failed to run {}: {}", self.program, e),
            })?;

        let code = output.status.code();
        debug!(host, ?code, "ping finished");

        interpret_exit(
            &self.program,
            host,
            settings,
            code,
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }
}

/// Map ping's exit status and output to a result. A missing route is an
/// unreachable host, not a transport failure.
fn interpret_exit(
    program: &str,
    host: &str,
    settings: &ProbeSettings,
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
) -> Result<ProbeResult, ProbeError> {
    match code {
        Some(0) | Some(EXIT_NO_REPLY) => parse_summary(host, stdout),
        Some(EXIT_ERROR) if ROUTE_ERRORS.iter().any(|m| stderr.contains(m)) => {
            debug!(host, "No route: {}", stderr.trim());
            Ok(ProbeResult::from_counts(settings.count, 0, Duration::ZERO))
        }
        _ => Err(ProbeError::RunFailed {
            host: host.to_string(),
            message: format!("{} exited with {:?}: {}", program, code, stderr.trim()),
        }),
    }
}

/// Parse the statistics block of ping's output.
pub fn parse_summary(host: &str, output: &str) -> Result<ProbeResult, ProbeError> {
    let caps = SUMMARY_RE
        .captures(output)
        .ok_or_else(|| ProbeError::Unparseable {
            host: host.to_string(),
            message: "no packet summary in ping output".to_string(),
        })?;

    let count = |i: usize| -> Result<u32, ProbeError> {
        caps[i].parse().map_err(|e| ProbeError::Unparseable {
            host: host.to_string(),
            message: format!("bad packet count '{}': {}", &caps[i], e),
        })
    };
    let sent = count(1)?;
    let received = count(2)?;

    let max_rtt = RTT_RE
        .captures(output)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
        .unwrap_or(Duration::ZERO);

    Ok(ProbeResult::from_counts(sent, received, max_rtt))
}
