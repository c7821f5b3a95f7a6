// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::api::ECB_HISTORY_URL;
use crate::error::ReportError;
use crate::messages::MessageTemplate;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub amount: i64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub base_currency: String,
    /// One chart per group, e.g. `[["EUR", "GBP"], ["BRL"]]`
    pub groups: Vec<Vec<String>>,
    pub sender: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default)]
    pub template: MessageTemplate,
    #[serde(default)]
    pub attach_csv: bool,
    /// Extra files mailed with the charts (images, audio or CSV)
    #[serde(default)]
    pub extra_attachments: Vec<PathBuf>,
    #[serde(default = "default_source_url")]
    pub source_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub smtp_timeout_secs: u64,
    pub window: WindowConfig,
}

fn default_signature() -> String {
    "The Data Team".to_string()
}

fn default_source_url() -> String {
    ECB_HISTORY_URL.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_currency: "AUD".to_string(),
            groups: vec![
                vec!["EUR".to_string(), "GBP".to_string()],
                vec!["BRL".to_string()],
            ],
            sender: String::new(),
            recipients: Vec::new(),
            cc: Vec::new(),
            subject: "Euro/GBP/BRL Currency Exchange Rates".to_string(),
            signature: default_signature(),
            template: MessageTemplate::default(),
            attach_csv: false,
            extra_attachments: Vec::new(),
            source_url: default_source_url(),
            output_dir: default_output_dir(),
            cache_dir: default_cache_dir(),
            fetch_timeout_secs: default_timeout_secs(),
            smtp_timeout_secs: default_timeout_secs(),
            window: WindowConfig {
                amount: 1,
                unit: "month".to_string(),
            },
        }
    }
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp_timeout_secs)
    }

    /// Everything needed to build charts.
    pub fn validate_charts(&self) -> Result<(), ReportError> {
        if self.base_currency.trim().is_empty() {
            return Err(ReportError::MissingConfig("base_currency".to_string()));
        }
        if self.groups.is_empty() {
            return Err(ReportError::MissingConfig("groups".to_string()));
        }
        if let Some(i) = self.groups.iter().position(|g| g.is_empty()) {
            return Err(ReportError::MissingConfig(format!("groups[{}] is empty", i)));
        }
        Ok(())
    }

    /// Everything needed to build charts and mail them.
    pub fn validate(&self) -> Result<(), ReportError> {
        self.validate_charts()?;
        if self.sender.trim().is_empty() {
            return Err(ReportError::MissingConfig("sender".to_string()));
        }
        if self.recipients.is_empty() {
            return Err(ReportError::MissingConfig("recipients".to_string()));
        }
        Ok(())
    }
}

pub fn get_config_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("config.toml");
    path
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// SMTP credentials, supplied through the environment (or `.env`).
#[derive(Clone, PartialEq)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, ReportError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ReportError::MissingConfig(format!("{} environment variable", key)))
        };

        let port = match lookup("SMTP_PORT").filter(|v| !v.trim().is_empty()) {
            Some(port) => port.trim().parse::<u16>().map_err(|_| {
                ReportError::MissingConfig(format!("SMTP_PORT {:?} is not a port number", port))
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Self {
            server: required("SMTP_SERVER")?,
            port,
            username: required("SMTP_USERNAME")?,
            password: required("SMTP_PASSWORD")?,
        })
    }
}
