//! Remediation seam: one fixed command over an authenticated remote session.

use crate::address::Address;
use crate::error::RemediationError;
use serde::Deserialize;
use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Login for the device. The secret answers every interactive challenge.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(alias = "password")]
    pub secret: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What to run on the device, and as whom.
#[derive(Debug, Clone)]
pub struct RemediationPlan {
    pub credentials: Credentials,
    pub command: String,
}

impl RemediationPlan {
    pub fn new(credentials: Credentials, command: impl Into<String>) -> Self {
        Self {
            credentials,
            command: command.into(),
        }
    }
}

/// Executes a single command on a remote host and returns its combined
/// stdout/stderr. Any session or command failure is an error value.
#[cfg_attr(test, automock)]
pub trait RemoteShell {
    fn execute(
        &self,
        address: &Address,
        credentials: &Credentials,
        command: &str,
    ) -> Result<String, RemediationError>;
}

impl<T: RemoteShell + ?Sized> RemoteShell for &T {
    fn execute(
        &self,
        address: &Address,
        credentials: &Credentials,
        command: &str,
    ) -> Result<String, RemediationError> {
        (**self).execute(address, credentials, command)
    }
}
