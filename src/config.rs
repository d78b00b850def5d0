//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::policy::{MailboxRole, Mailboxes, OrganizationCodes};
use crate::proposal::StatusPolicy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of compact text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "approvalflow=debug".to_string(),
            json: false,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub log: LogConfig,
    pub status: StatusPolicy,
    pub mailboxes: Mailboxes,
    pub organizations: OrganizationCodes,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log = LogConfig {
            filter: lookup("LOG_FILTER")
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| LogConfig::default().filter),
            json: match lookup("LOG_JSON") {
                Some(value) => parse_bool("LOG_JSON", &value)?,
                None => false,
            },
        };

        let status = StatusPolicy {
            resurrect_cancelled: match lookup("APPROVALS_RESURRECT_CANCELLED") {
                Some(value) => parse_bool("APPROVALS_RESURRECT_CANCELLED", &value)?,
                None => false,
            },
        };

        let mut mailboxes = Mailboxes::new();
        for role in MailboxRole::ALL {
            if let Some(address) = lookup(role.env_var()).filter(|a| !a.trim().is_empty()) {
                mailboxes.set(role, address.trim().to_string());
            }
        }

        let organizations = OrganizationCodes {
            whsc: lookup("WHSC_ORG_CODES").map(|s| parse_list(&s)).unwrap_or_default(),
            ool: lookup("OOL_ORG_CODES").map(|s| parse_list(&s)).unwrap_or_default(),
        };

        Ok(Self {
            log,
            status,
            mailboxes,
            organizations,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

/// Comma-separated list, blanks dropped
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
