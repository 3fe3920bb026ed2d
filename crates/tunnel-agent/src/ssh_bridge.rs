//! [`RemoteShell`] over SSH (libssh2).
//!
//! Keyboard-interactive authentication, answering every prompt with the
//! configured secret. One channel, one command, stderr merged into stdout.

use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use ssh2::{ExtendedData, HashType, KeyboardInteractivePrompt, Prompt, Session};
use tracing::{debug, info};
use tunnel_escalation::{Address, Credentials, RemediationError, RemoteShell};

use crate::config::DeviceConfig;

/// Answers every keyboard-interactive challenge with the same secret.
struct SecretPrompter<'a> {
    secret: &'a str,
}

impl KeyboardInteractivePrompt for SecretPrompter<'_> {
    fn prompt<'b>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[Prompt<'b>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.secret.to_string()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct SshRemoteShell {
    port: u16,
    timeout: Duration,
    /// Expected host key SHA-256, unpadded base64
    host_key_sha256: Option<String>,
}

impl SshRemoteShell {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            host_key_sha256: None,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut shell = Self::new(config.port, Duration::from_secs(config.connect_timeout_secs));
        shell.host_key_sha256 = config.host_key_sha256.as_deref().map(normalize_fingerprint);
        shell
    }

    fn connect(&self, host: &str) -> Result<Session, RemediationError> {
        let connect_err = |message: String| RemediationError::Connect {
            host: host.to_string(),
            port: self.port,
            message,
        };

        let addr: SocketAddr = (host, self.port)
            .to_socket_addrs()
            .map_err(|e| connect_err(e.to_string()))?
            .next()
            .ok_or_else(|| connect_err("no address resolved".to_string()))?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout)
            .map_err(|e| connect_err(e.to_string()))?;

        let handshake_err = |e: ssh2::Error| RemediationError::Handshake {
            host: host.to_string(),
            message: e.to_string(),
        };

        let mut session = Session::new().map_err(handshake_err)?;
        session.set_timeout(self.timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session.handshake().map_err(handshake_err)?;

        self.verify_host_key(host, &session)?;
        Ok(session)
    }

    fn verify_host_key(&self, host: &str, session: &Session) -> Result<(), RemediationError> {
        let Some(expected) = &self.host_key_sha256 else {
            return Ok(());
        };

        let actual = session
            .host_key_hash(HashType::Sha256)
            .map(|h| STANDARD_NO_PAD.encode(h))
            .unwrap_or_default();

        if &actual != expected {
            return Err(RemediationError::HostKeyMismatch {
                host: host.to_string(),
                actual: format!("SHA256:{}", actual),
            });
        }
        Ok(())
    }

    fn authenticate(
        &self,
        host: &str,
        session: &Session,
        credentials: &Credentials,
    ) -> Result<(), RemediationError> {
        let auth_err = |message: String| RemediationError::Authentication {
            host: host.to_string(),
            username: credentials.username.clone(),
            message,
        };

        let mut prompter = SecretPrompter {
            secret: &credentials.secret,
        };
        session
            .userauth_keyboard_interactive(&credentials.username, &mut prompter)
            .map_err(|e| auth_err(e.to_string()))?;

        if !session.authenticated() {
            return Err(auth_err("server did not accept the credentials".to_string()));
        }
        Ok(())
    }
}

/// Accepts `SHA256:abc...`, `abc...=` or `abc...`.
pub fn normalize_fingerprint(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix("SHA256:")
        .unwrap_or(raw)
        .trim_end_matches('=')
        .to_string()
}

impl RemoteShell for SshRemoteShell {
    fn execute(
        &self,
        address: &Address,
        credentials: &Credentials,
        command: &str,
    ) -> Result<String, RemediationError> {
        let host = address.host.as_str();
        let session = self.connect(host)?;
        self.authenticate(host, &session, credentials)?;
        info!(host, user = %credentials.username, "SSH session established");

        let channel_err = |e: ssh2::Error| RemediationError::Channel {
            host: host.to_string(),
            message: e.to_string(),
        };

        let mut channel = session.channel_session().map_err(channel_err)?;
        channel
            .handle_extended_data(ExtendedData::Merge)
            .map_err(channel_err)?;
        channel.exec(command).map_err(channel_err)?;

        let mut output = String::new();
        channel
            .read_to_string(&mut output)
            .map_err(|e| RemediationError::Channel {
                host: host.to_string(),
                message: e.to_string(),
            })?;
        channel.wait_close().map_err(channel_err)?;
        let status = channel.exit_status().map_err(channel_err)?;
        debug!(host, status, "Remote command finished");

        if status != 0 {
            return Err(RemediationError::CommandFailed {
                command: command.to_string(),
                status,
                output: output.trim().to_string(),
            });
        }
        Ok(output)
    }
}
