//! Monitored endpoints and the role each one plays in fault localization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of an address in the three-tier reachability protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressRole {
    /// Only reachable through the VPN tunnel being monitored
    Tunnel,
    /// Stable external endpoint, separates "tunnel down" from "no internet"
    Wan,
    /// Local gateway that can be told to restart the tunnel
    Device,
}

impl fmt::Display for AddressRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tunnel => write!(f, "Tunnel"),
            Self::Wan => write!(f, "WAN"),
            Self::Device => write!(f, "Device"),
        }
    }
}

/// A host paired with its role. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub role: AddressRole,
    pub host: String,
}

impl Address {
    pub fn new(role: AddressRole, host: impl Into<String>) -> Self {
        Self {
            role,
            host: host.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} address {}", self.role, self.host)
    }
}

/// The three addresses a cycle walks through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Targets {
    pub tunnel: Address,
    pub wan: Address,
    pub device: Address,
}

impl Targets {
    pub fn new(
        tunnel: impl Into<String>,
        wan: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            tunnel: Address::new(AddressRole::Tunnel, tunnel),
            wan: Address::new(AddressRole::Wan, wan),
            device: Address::new(AddressRole::Device, device),
        }
    }
}
