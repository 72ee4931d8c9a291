//! AuthApi backed by the AWS CLI SSO flow

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use awss_core::{AuthApi, Error, Profile, Result, SsoPreflight};

/// Default time allowed for the interactive browser login
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Session checks via the SSO token cache, renewal via `aws sso login`
#[derive(Debug, Clone)]
pub struct SsoAuth {
    preflight: SsoPreflight,
    program: String,
    timeout: Duration,
}

impl SsoAuth {
    pub fn new(preflight: SsoPreflight) -> Self {
        Self {
            preflight,
            program: "aws".to_string(),
            timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    /// Use a different executable in place of the AWS CLI
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl AuthApi for SsoAuth {
    async fn is_session_valid(&self, profile: &Profile) -> Result<bool> {
        Ok(!self.preflight.needs_login(&profile.name, jiff::Timestamp::now()))
    }

    async fn reauthenticate(&self, profile: &Profile) -> Result<()> {
        tracing::info!(profile = %profile, "Starting SSO login");

        // stdout carries command output, so the login chatter goes to stderr
        let mut child = Command::new(&self.program)
            .args(["sso", "login", "--profile", &profile.name])
            .stdin(Stdio::inherit())
            .stdout(std::io::stderr())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::General(format!("failed to run {}: {e}", self.program)))?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "sso login for '{}' after {}s",
                    profile.name,
                    self.timeout.as_secs()
                )));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(Error::General(format!(
                "{} sso login exited with {status}",
                self.program
            )))
        }
    }
}
