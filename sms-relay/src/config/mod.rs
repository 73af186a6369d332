//! Relay configuration.
//!
//! Loaded once at startup from a JSON file and validated eagerly; every
//! problem found here is fatal. Nothing is reloaded at runtime.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::database::database_url_for_file;
use crate::modem::DEFAULT_SEND_COMMAND;
use crate::relay::channels::{SmtpSettings, parse_mailbox};
use crate::relay::provider::{ProviderDescriptor, parse_method};
use crate::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "SMS_RELAY_CONFIG";

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

const SAMPLE_SUFFIX: &str = ".sample";

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baudrate() -> u32 {
    115_200
}

fn default_send_command() -> Vec<String> {
    DEFAULT_SEND_COMMAND.iter().map(|s| s.to_string()).collect()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_database_file() -> String {
    "sms_database.db".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    5
}

fn default_reassembly_timeout_secs() -> u64 {
    24 * 60 * 60
}

/// Modem connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModemConfig {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default)]
    pub pin: Option<String>,
    /// Argument template for outbound SMS; see `CommandModem`.
    #[serde(default = "default_send_command")]
    pub send_command: Vec<String>,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baudrate: default_baudrate(),
            pin: None,
            send_command: default_send_command(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// From address; falls back to `smtp_user`.
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_true")]
    pub starttls: bool,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: None,
            smtp_port: default_smtp_port(),
            smtp_user: None,
            smtp_password: None,
            sender: None,
            recipients: Vec::new(),
            starttls: true,
            max_retries: None,
        }
    }
}

/// One HTTP API provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    /// Receives messages that carry no provider hint.
    #[serde(default)]
    pub default: bool,
    /// URL template.
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Seconds; falls back to the global `default_timeout`.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_file")]
    pub file: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: default_database_file(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub modem: ModemConfig,
    #[serde(default)]
    pub sms_recipients: Vec<String>,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub api_providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub sms_max_retries: Option<u32>,
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
    #[serde(default = "default_reassembly_timeout_secs")]
    pub reassembly_timeout_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            modem: ModemConfig::default(),
            sms_recipients: Vec::new(),
            email: EmailConfig::default(),
            api_providers: Vec::new(),
            database: DatabaseConfig::default(),
            default_timeout: default_timeout_secs(),
            max_retries: default_max_retries(),
            sms_max_retries: None,
            retry_base_delay_secs: default_retry_base_delay_secs(),
            reassembly_timeout_secs: default_reassembly_timeout_secs(),
            log_dir: None,
            debug: false,
        }
    }
}

/// Path of the configuration file, honouring [`CONFIG_PATH_ENV`].
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn sample_path(path: &Path) -> PathBuf {
    let mut sample = path.as_os_str().to_owned();
    sample.push(SAMPLE_SUFFIX);
    PathBuf::from(sample)
}

impl RelayConfig {
    /// Parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Like [`RelayConfig::load`], but seeds a missing file from
    /// `<path>.sample` first.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let sample = sample_path(path);
            if !sample.exists() {
                return Err(Error::config(format!(
                    "Config file {} not found and no {} to copy",
                    path.display(),
                    sample.display()
                )));
            }
            std::fs::copy(&sample, path)?;
            info!("Created {} from {}", path.display(), sample.display());
        }
        Self::load(path)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for provider in &self.api_providers {
            if provider.name.trim().is_empty() {
                return Err(Error::config("API provider name must not be empty"));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(Error::config(format!(
                    "Duplicate API provider name '{}'",
                    provider.name
                )));
            }
            if provider.endpoint.trim().is_empty() {
                return Err(Error::config(format!(
                    "API provider '{}' has no endpoint",
                    provider.name
                )));
            }
            parse_method(&provider.name, &provider.method)?;
            for header in provider.headers.keys() {
                if header.parse::<HeaderName>().is_err() {
                    return Err(Error::config(format!(
                        "Invalid header name '{}' for provider '{}'",
                        header, provider.name
                    )));
                }
            }
        }

        if !self.email.recipients.is_empty()
            && self
                .email
                .smtp_server
                .as_deref()
                .is_none_or(|s| s.trim().is_empty())
        {
            return Err(Error::config(
                "email.smtp_server is required when email recipients are configured",
            ));
        }

        if !self.email.recipients.is_empty() {
            parse_mailbox(&self.email_sender())?;
            for recipient in &self.email.recipients {
                parse_mailbox(recipient)?;
            }
        }

        if self
            .modem
            .send_command
            .first()
            .is_none_or(|program| program.trim().is_empty())
        {
            return Err(Error::config("modem.send_command must not be empty"));
        }

        Ok(())
    }

    pub fn database_url(&self) -> String {
        database_url_for_file(&self.database.file)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_secs(self.reassembly_timeout_secs)
    }

    pub fn sms_max_retries(&self) -> u32 {
        self.sms_max_retries.unwrap_or(self.max_retries)
    }

    pub fn email_max_retries(&self) -> u32 {
        self.email.max_retries.unwrap_or(self.max_retries)
    }

    pub fn email_sender(&self) -> String {
        self.email
            .sender
            .clone()
            .or_else(|| self.email.smtp_user.clone())
            .unwrap_or_else(|| "sms-relay@localhost".to_string())
    }

    /// SMTP settings, when a server is configured.
    pub fn smtp_settings(&self) -> Option<SmtpSettings> {
        let server = self.email.smtp_server.clone()?;
        Some(SmtpSettings {
            server,
            port: self.email.smtp_port,
            username: self.email.smtp_user.clone(),
            password: self.email.smtp_password.clone(),
            starttls: self.email.starttls,
            timeout: self.default_timeout(),
        })
    }

    pub fn provider_descriptors(&self) -> Vec<ProviderDescriptor> {
        self.api_providers
            .iter()
            .map(|p| ProviderDescriptor::from_config(p, self.default_timeout(), self.max_retries))
            .collect()
    }
}
