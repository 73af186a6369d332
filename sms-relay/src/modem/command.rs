//! Outbound SMS through an external gateway command.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::Modem;
use crate::{Error, Result};

/// Argument template used when none is configured.
pub const DEFAULT_SEND_COMMAND: &[&str] =
    &["gammu-smsd-inject", "TEXT", "{recipient}", "-text", "{body}"];

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs one command per outbound message.
///
/// Each argument of the template may contain `{port}`, `{recipient}` and
/// `{body}`. Arguments are passed without a shell.
#[derive(Debug, Clone)]
pub struct CommandModem {
    template: Vec<String>,
    port: String,
    timeout: Duration,
}

impl CommandModem {
    pub fn new(template: Vec<String>, port: impl Into<String>) -> Result<Self> {
        if template.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(Error::config("Modem send command must not be empty"));
        }
        Ok(Self {
            template,
            port: port.into(),
            timeout: DEFAULT_SEND_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn render(&self, recipient: &str, body: &str) -> Vec<String> {
        self.template
            .iter()
            .map(|arg| {
                arg.replace("{port}", &self.port)
                    .replace("{recipient}", recipient)
                    .replace("{body}", body)
            })
            .collect()
    }
}

#[async_trait]
impl Modem for CommandModem {
    async fn send(&self, recipient: &str, body: &str) -> Result<()> {
        let args = self.render(recipient, body);
        let Some((program, rest)) = args.split_first() else {
            return Err(Error::config("Modem send command must not be empty"));
        };

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::transport(format!(
                    "{} timed out after {:?} sending to {}",
                    program, self.timeout, recipient
                ))
            })?
            .map_err(|e| Error::transport(format!("Failed to spawn {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transport(format!(
                "{} failed with exit code {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        debug!("SMS handed to {} for {}", program, recipient);
        Ok(())
    }
}
