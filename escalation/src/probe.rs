//! Reachability probing and classification
//!
//! A probe is a bounded burst of echo requests against one address. The raw
//! statistics are classified immediately and never persisted:
//!
//! ```text
//! received == 0 || max_rtt == 0   → Unreachable   (no valid sample)
//! received < sent || loss > 0     → Degraded      (reachable, logged)
//! otherwise                       → Clean         (reachable)
//! ```
//!
//! A transport failure is a `ProbeError`, never an `Unreachable` verdict.

use crate::address::Address;
use crate::error::ProbeError;
use crate::event_log::EventLog;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Burst parameters for one probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Number of echo requests to send
    pub count: u32,
    /// Wait between requests
    pub interval: Duration,
    /// Hard deadline for the whole run
    pub timeout: Duration,
}

impl ProbeSettings {
    /// Burst used to localize a fault.
    pub fn standard() -> Self {
        Self {
            count: 5,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(20),
        }
    }

    /// Short burst used to confirm the device is alive before a session.
    pub fn liveness() -> Self {
        Self {
            count: 2,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::standard()
    }
}

/// Raw statistics from one probe run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub sent: u32,
    pub received: u32,
    /// Fraction of requests lost, in `[0, 1]`
    pub loss_fraction: f64,
    pub max_rtt: Duration,
}

impl ProbeResult {
    /// Build a result, deriving the loss fraction from the counts.
    pub fn from_counts(sent: u32, received: u32, max_rtt: Duration) -> Self {
        let loss_fraction = if sent == 0 {
            1.0
        } else {
            1.0 - (received.min(sent) as f64 / sent as f64)
        };
        Self {
            sent,
            received,
            loss_fraction,
            max_rtt,
        }
    }
}

/// Verdict derived from a [`ProbeResult`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reachability {
    Unreachable,
    /// Reachable, but some requests were lost
    Degraded { loss_fraction: f64 },
    Clean,
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Self::Unreachable)
    }
}

/// Classify raw statistics. Rules are evaluated in precedence order.
pub fn classify(result: &ProbeResult) -> Reachability {
    if result.received == 0 || result.max_rtt.is_zero() {
        return Reachability::Unreachable;
    }

    if result.received < result.sent || result.loss_fraction > 0.0 {
        return Reachability::Degraded {
            loss_fraction: result.loss_fraction,
        };
    }

    Reachability::Clean
}

/// Sends the actual echo requests. Implemented over ICMP by the agent binary.
#[cfg_attr(test, automock)]
pub trait ProbeTransport {
    fn run(&self, host: &str, settings: &ProbeSettings) -> Result<ProbeResult, ProbeError>;
}

impl<T: ProbeTransport + ?Sized> ProbeTransport for &T {
    fn run(&self, host: &str, settings: &ProbeSettings) -> Result<ProbeResult, ProbeError> {
        (**self).run(host, settings)
    }
}

/// Runs a transport and classifies the outcome.
pub struct Prober<T> {
    transport: T,
}

impl<T: ProbeTransport> Prober<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Probe one address. A degraded link is written to the event log.
    pub fn probe(
        &self,
        address: &Address,
        settings: &ProbeSettings,
        log: &EventLog,
    ) -> Result<Reachability, ProbeError> {
        let result = self.transport.run(&address.host, settings)?;
        let verdict = classify(&result);

        debug!(
            role = %address.role,
            host = %address.host,
            sent = result.sent,
            received = result.received,
            max_rtt_ms = result.max_rtt.as_millis() as u64,
            reachable = verdict.is_reachable(),
            "Probe complete"
        );

        if let Reachability::Degraded { loss_fraction } = verdict {
            let percent = loss_fraction * 100.0;
            warn!(role = %address.role, host = %address.host, loss = percent, "Packet loss on reachable link");
            log.note(format!(
                "Ping to {} reveals packet loss at: {:.1}%",
                address, percent
            ));
        }

        Ok(verdict)
    }
}
