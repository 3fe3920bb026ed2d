//! Tunnel agent: concrete collaborators for the escalation engine.
//!
//! - `config`: TOML configuration with environment overrides
//! - `manage_bridge`: ConnectWise Manage ticket store
//! - `ping_bridge`: system `ping` reachability transport
//! - `ssh_bridge`: SSH remote shell for the restart command

pub mod config;
pub mod manage_bridge;
pub mod ping_bridge;
pub mod ssh_bridge;

pub use config::AgentConfig;
pub use manage_bridge::ManageClient;
pub use ping_bridge::SystemPing;
pub use ssh_bridge::SshRemoteShell;
