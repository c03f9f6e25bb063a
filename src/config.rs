//! Configuration types.
//!
//! Everything comes from environment variables. Credentials may instead be
//! read from a TOML file with `user` and `password` keys.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::scan::extract::DEFAULT_KEYWORD;

const DEFAULT_CREDENTIALS_FILE: &str = "credentials.toml";

/// Already-validated login for the mailbox server.
#[derive(Debug)]
pub struct Credentials {
    pub user: String,
    pub password: SecretString,
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            user: self.user.clone(),
            password: SecretString::from(self.password.expose_secret().to_string()),
        }
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    user: String,
    password: String,
}

impl Credentials {
    /// Build credentials, rejecting an empty user or password.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let user = user.into();
        let password = password.into();
        if user.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "user".into(),
                message: "must not be empty".into(),
            });
        }
        if password.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "password".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(Self {
            user: user.trim().to_string(),
            password: SecretString::from(password),
        })
    }

    /// Load credentials from a TOML file.
    ///
    /// YAML files (`.yaml`/`.yml`) are refused with a hint to rewrite them
    /// as TOML; both use the same `user` and `password` keys.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            return Err(ConfigError::ParseError {
                path: display,
                message: "YAML credentials are not supported; rewrite as TOML \
                          (user = \"...\" and password = \"...\")"
                    .into(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialsFile {
            path: display.clone(),
            source,
        })?;
        let file: CredentialsFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
            path: display,
            message: e.to_string(),
        })?;
        Self::new(file.user, file.password)
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format '{other}' (expected text or json)")),
        }
    }
}

/// Scanner configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub imap_host: String,
    pub imap_port: u16,
    /// Mailbox selected on every session.
    pub mailbox: String,
    pub credentials: Credentials,
    /// Number of workers and sessions.
    pub workers: usize,
    /// Body term for discovery and keyword for anchor text.
    pub search_term: String,
    /// Socket read/write timeout, bounding every fetch.
    pub fetch_timeout: Duration,
    pub output_path: PathBuf,
    pub output_format: OutputFormat,
    pub progress_interval: Duration,
}

impl ScanConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let imap_host = lookup("UNSUB_IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".to_string());
        let imap_port = parse_or(&lookup, "UNSUB_IMAP_PORT", 993u16)?;
        let mailbox = lookup("UNSUB_MAILBOX").unwrap_or_else(|| "INBOX".to_string());

        let workers = parse_or(&lookup, "UNSUB_WORKERS", 10usize)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "UNSUB_WORKERS".into(),
                message: "must be at least 1".into(),
            });
        }

        let search_term = lookup("UNSUB_SEARCH_TERM")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KEYWORD.to_string());
        let fetch_timeout_secs = parse_or(&lookup, "UNSUB_FETCH_TIMEOUT_SECS", 30u64)?;
        if fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "UNSUB_FETCH_TIMEOUT_SECS".into(),
                message: "must be at least 1".into(),
            });
        }
        let fetch_timeout = Duration::from_secs(fetch_timeout_secs);
        let progress_interval =
            Duration::from_secs(parse_or(&lookup, "UNSUB_PROGRESS_INTERVAL_SECS", 5u64)?.max(1));
        let output_path = lookup("UNSUB_OUTPUT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("unsubscribe_links.txt"));
        let output_format = match lookup("UNSUB_OUTPUT_FORMAT") {
            Some(s) => s.parse().map_err(|message| ConfigError::InvalidValue {
                key: "UNSUB_OUTPUT_FORMAT".into(),
                message,
            })?,
            None => OutputFormat::default(),
        };

        let credentials = match (lookup("UNSUB_USER"), lookup("UNSUB_PASSWORD")) {
            (Some(user), Some(password)) => Credentials::new(user, password)?,
            _ => {
                let path = lookup("UNSUB_CREDENTIALS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_FILE));
                if !path.exists() {
                    return Err(ConfigError::MissingRequired {
                        key: "credentials".into(),
                        hint: format!(
                            "Set UNSUB_USER and UNSUB_PASSWORD, or create {}",
                            path.display()
                        ),
                    });
                }
                Credentials::from_file(&path)?
            }
        };

        Ok(Self {
            imap_host,
            imap_port,
            mailbox,
            credentials,
            workers,
            search_term,
            fetch_timeout,
            output_path,
            output_format,
            progress_interval,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
