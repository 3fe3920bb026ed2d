//! Agent configuration.
//!
//! Loaded from a TOML file, then overlaid with `TUNNEL_AGENT_*` environment
//! variables so secrets can stay out of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tunnel_escalation::{
    ClosedStatuses, Credentials, EscalationConfig, IncidentNotes, IncidentTemplate, ProbeSettings,
    RemediationPlan, Targets, TicketPolicy,
};

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub targets: TargetsConfig,
    #[serde(default = "ProbeConfig::standard")]
    pub probe: ProbeConfig,
    #[serde(default = "ProbeConfig::liveness")]
    pub liveness: ProbeConfig,
    pub manage: ManageConfig,
    pub device: DeviceConfig,
    #[serde(default)]
    pub notes: IncidentNotes,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetsConfig {
    pub tunnel: String,
    pub wan: String,
    pub device: String,
}

/// Echo burst parameters, in whole seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProbeConfig {
    pub count: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    1
}

impl ProbeConfig {
    fn standard() -> Self {
        Self::from_settings(ProbeSettings::standard())
    }

    fn liveness() -> Self {
        Self::from_settings(ProbeSettings::liveness())
    }

    fn from_settings(s: ProbeSettings) -> Self {
        Self {
            count: s.count,
            interval_secs: s.interval.as_secs(),
            timeout_secs: s.timeout.as_secs(),
        }
    }

    pub fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            count: self.count,
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// ConnectWise Manage API access.
#[derive(Clone, Deserialize)]
pub struct ManageConfig {
    /// Service API root, e.g. `https://na.myconnectwise.net/v4_6_release/apis/3.0/service`
    pub base_url: String,
    pub company_id: String,
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
    pub client_id: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub closed_statuses: ClosedStatuses,
    pub ticket: IncidentTemplate,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl std::fmt::Debug for ManageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManageConfig")
            .field("base_url", &self.base_url)
            .field("company_id", &self.company_id)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("closed_statuses", &self.closed_statuses)
            .field("ticket", &self.ticket)
            .finish()
    }
}

/// Remote session to the tunnel endpoint device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Base64 SHA-256 host key fingerprint; unset disables pinning
    #[serde(default)]
    pub host_key_sha256: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_command() -> String {
    "ipsec restart".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_event_log")]
    pub event_log: PathBuf,
    #[serde(default = "default_incident_state")]
    pub incident_state: PathBuf,
}

fn default_event_log() -> PathBuf {
    PathBuf::from("pingo.log")
}

fn default_incident_state() -> PathBuf {
    PathBuf::from("incident.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            event_log: default_event_log(),
            incident_state: default_incident_state(),
        }
    }
}

impl AgentConfig {
    /// Read, parse, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse agent config TOML")
    }

    /// Overlay secrets and the API root from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("TUNNEL_AGENT_MANAGE_PRIVATE_KEY") {
            self.manage.private_key = key;
        }
        if let Some(key) = lookup("TUNNEL_AGENT_MANAGE_PUBLIC_KEY") {
            self.manage.public_key = key;
        }
        if let Some(url) = lookup("TUNNEL_AGENT_MANAGE_URL") {
            self.manage.base_url = url;
        }
        if let Some(password) = lookup("TUNNEL_AGENT_DEVICE_PASSWORD") {
            self.device.credentials.secret = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, host) in [
            ("targets.tunnel", &self.targets.tunnel),
            ("targets.wan", &self.targets.wan),
            ("targets.device", &self.targets.device),
        ] {
            if host.trim().is_empty() {
                bail!("{name} must not be empty");
            }
        }

        for (name, probe) in [("probe", &self.probe), ("liveness", &self.liveness)] {
            if probe.count == 0 {
                bail!("{name}.count must be at least 1");
            }
            if probe.interval_secs == 0 {
                bail!("{name}.interval_secs must be at least 1");
            }
            if probe.timeout_secs == 0 {
                bail!("{name}.timeout_secs must be non-zero");
            }
        }

        if self.manage.base_url.trim().is_empty() {
            bail!("manage.base_url must not be empty");
        }
        if self.manage.private_key.is_empty() {
            bail!("manage.private_key is not set (config or TUNNEL_AGENT_MANAGE_PRIVATE_KEY)");
        }
        if self.manage.timeout_secs == 0 {
            bail!("manage.timeout_secs must be non-zero");
        }
        if self.device.credentials.username.is_empty() {
            bail!("device.username must not be empty");
        }
        if self.device.credentials.secret.is_empty() {
            bail!("device.password is not set (config or TUNNEL_AGENT_DEVICE_PASSWORD)");
        }
        if self.device.command.trim().is_empty() {
            bail!("device.command must not be empty");
        }
        if self.device.connect_timeout_secs == 0 {
            bail!("device.connect_timeout_secs must be non-zero");
        }
        Ok(())
    }

    /// Engine-facing view of this configuration.
    pub fn escalation_config(&self) -> EscalationConfig {
        EscalationConfig {
            targets: Targets::new(
                self.targets.tunnel.trim(),
                self.targets.wan.trim(),
                self.targets.device.trim(),
            ),
            probe: self.probe.settings(),
            liveness: self.liveness.settings(),
            tickets: TicketPolicy {
                template: self.manage.ticket.clone(),
                closed_statuses: self.manage.closed_statuses.clone(),
                notes: self.notes.clone(),
            },
            remediation: RemediationPlan::new(
                self.device.credentials.clone(),
                self.device.command.clone(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[targets]
tunnel = "10.8.0.1"
wan = "8.8.8.8"
device = "192.168.1.1"

[manage]
base_url = "https://na.myconnectwise.net/v4_6_release/apis/3.0/service"
company_id = "acme"
public_key = "pub"
private_key = "priv"
client_id = "3e53e6c4"

[manage.ticket]
summary = "SCRIPT TICKET - TCT VPN Tunnel Down"
contact = 1694
board = 1
status = 579
company = 19786
type = 193
sub_type = 7
item = 57
priority = 6

[device]
username = "admin"
secret = "pw"
"#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = AgentConfig::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.probe.settings(), ProbeSettings::standard());
        assert_eq!(config.liveness.settings(), ProbeSettings::liveness());
        assert_eq!(config.device.port, 22);
        assert_eq!(config.device.command, "ipsec restart");
        assert_eq!(config.device.connect_timeout_secs, 5);
        assert!(config.device.host_key_sha256.is_none());
        assert_eq!(config.paths.event_log, PathBuf::from("pingo.log"));
        assert_eq!(config.manage.ticket.record_type, "ServiceTicket");
        assert_eq!(config.manage.ticket.ticket_type, 193);
        assert!(config.manage.closed_statuses.contains(452));
        assert_eq!(config.notes, IncidentNotes::default());
    }

    #[test]
    fn test_env_overrides_replace_secrets() {
        let mut config = AgentConfig::parse(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("TUNNEL_AGENT_MANAGE_PRIVATE_KEY", "from-env"),
            ("TUNNEL_AGENT_DEVICE_PASSWORD", "dev-env"),
            ("TUNNEL_AGENT_MANAGE_URL", "http://127.0.0.1:9999"),
        ]);
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.manage.private_key, "from-env");
        assert_eq!(config.manage.public_key, "pub");
        assert_eq!(config.manage.base_url, "http://127.0.0.1:9999");
        assert_eq!(config.device.credentials.secret, "dev-env");
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config = AgentConfig::parse(MINIMAL).unwrap();
        config.targets.wan = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("targets.wan"));
    }

    #[test]
    fn test_validate_rejects_zero_count_and_timeout() {
        let mut config = AgentConfig::parse(MINIMAL).unwrap();
        config.liveness.count = 0;
        assert!(config.validate().unwrap_err().to_string().contains("liveness.count"));

        let mut config = AgentConfig::parse(MINIMAL).unwrap();
        config.probe.timeout_secs = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("probe.timeout_secs"));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AgentConfig::parse(MINIMAL).unwrap();
        config.probe.interval_secs = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("probe.interval_secs"));
    }

    #[test]
    fn test_missing_device_password_is_rejected() {
        let mut config = AgentConfig::parse(MINIMAL).unwrap();
        config.device.credentials.secret.clear();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("device.password"));

        config.apply_overrides(|k| {
            (k == "TUNNEL_AGENT_DEVICE_PASSWORD").then(|| "from-env".to_string())
        });
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_private_key_is_rejected() {
        let config = AgentConfig::parse(&MINIMAL.replace("private_key = \"priv\"\n", "")).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_closed_statuses_and_notes() {
        let toml_str = MINIMAL.replace(
            "client_id = \"3e53e6c4\"",
            "client_id = \"3e53e6c4\"\nclosed_statuses = [1, 2]",
        ) + "\n[notes]\noutage = \"down\"\nremediated = \"up\"\nremediation_failed = \"stuck\"\n";
        let config = AgentConfig::parse(&toml_str).unwrap();

        assert!(config.manage.closed_statuses.contains(2));
        assert!(!config.manage.closed_statuses.contains(452));
        assert_eq!(config.notes.outage, "down");
    }

    #[test]
    fn test_escalation_config_maps_fields() {
        let config = AgentConfig::parse(MINIMAL).unwrap();
        let esc = config.escalation_config();

        assert_eq!(esc.targets.device.host, "192.168.1.1");
        assert_eq!(esc.remediation.command, "ipsec restart");
        assert_eq!(esc.remediation.credentials.username, "admin");
        assert_eq!(esc.tickets.template.company, 19786);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }

    #[test]
    fn test_example_config_parses() {
        let config =
            AgentConfig::parse(include_str!("../../../tunnel-agent.example.toml")).unwrap();
        assert_eq!(config.device.credentials.username, "admin");
        assert_eq!(config.manage.ticket.priority, 6);
        assert_eq!(config.paths.incident_state, PathBuf::from("incident.json"));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = AgentConfig::parse(MINIMAL).unwrap();
        let printed = format!("{:?}", config.manage);
        assert!(!printed.contains("priv\""));
        assert!(printed.contains("<redacted>"));
    }
}
