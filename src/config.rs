//! Process-wide configuration: transfer credentials from the environment.
//!
//! Credentials are read once at startup (after `.env` is loaded by the CLI)
//! into a `TransferConfig` that is handed to the transfer targets. Nothing
//! reads the environment after that.
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::symbology::SymbologyError;

pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_FTP_PORT: u16 = 21;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: String },
    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: String, value: String },
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid pipeline config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Symbology(#[from] SymbologyError),
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Host, credentials and timeout of one remote server.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Applied to connect, read and write
    pub timeout: Duration,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// Keeps passwords out of logs
impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub sftp: Endpoint,
    pub ftp: Endpoint,
}

impl TransferConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; tests inject a map here.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs = optional(&lookup, "TRANSFER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "TRANSFER_TIMEOUT_SECS".into(),
                value: "0".into(),
            });
        }
        let timeout = Duration::from_secs(timeout_secs);
        Ok(Self {
            sftp: endpoint(&lookup, "SFTP", DEFAULT_SFTP_PORT, timeout)?,
            ftp: endpoint(&lookup, "FTP", DEFAULT_FTP_PORT, timeout)?,
        })
    }
}

fn required<F: Fn(&str) -> Option<String>>(lookup: &F, var: &str) -> Result<String, ConfigError> {
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing { var: var.to_string() }),
    }
}

fn optional<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value,
        }),
    }
}

fn endpoint<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    prefix: &str,
    default_port: u16,
    timeout: Duration,
) -> Result<Endpoint, ConfigError> {
    Ok(Endpoint {
        host: required(lookup, &format!("{}_HOST", prefix))?,
        port: optional(lookup, &format!("{}_PORT", prefix), default_port)?,
        username: required(lookup, &format!("{}_USERNAME", prefix))?,
        password: required(lookup, &format!("{}_PASSWORD", prefix))?,
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("SFTP_HOST", "sftp.example.org"),
        ("SFTP_USERNAME", "maps"),
        ("SFTP_PASSWORD", "secret"),
        ("FTP_HOST", "ftp.example.org"),
        ("FTP_USERNAME", "web"),
        ("FTP_PASSWORD", "hunter2"),
    ];

    #[test]
    fn defaults_ports_and_timeout() {
        let config = TransferConfig::from_lookup(env(FULL)).unwrap();
        assert_eq!(config.sftp.port, 22);
        assert_eq!(config.ftp.port, 21);
        assert_eq!(config.sftp.timeout, Duration::from_secs(30));
        assert_eq!(config.ftp.host, "ftp.example.org");
    }

    #[test]
    fn explicit_port_and_timeout_are_used() {
        let mut pairs = FULL.to_vec();
        pairs.push(("SFTP_PORT", "2222"));
        pairs.push(("TRANSFER_TIMEOUT_SECS", "5"));
        let config = TransferConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.sftp.port, 2222);
        assert_eq!(config.ftp.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_credential_is_reported_by_name() {
        let pairs: Vec<_> = FULL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "FTP_PASSWORD")
            .collect();
        match TransferConfig::from_lookup(env(&pairs)) {
            Err(ConfigError::Missing { var }) => assert_eq!(var, "FTP_PASSWORD"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn non_numeric_port_is_invalid() {
        let mut pairs = FULL.to_vec();
        pairs.push(("FTP_PORT", "twenty-one"));
        assert!(matches!(
            TransferConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let config = TransferConfig::from_lookup(env(FULL)).unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("hunter2"));
    }
}
