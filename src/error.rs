//! Error types for the unsubscribe scanner.

use crate::scan::types::MessageId;

/// Top-level error type for the scan pipeline.
///
/// Every variant is fatal and attributable to one pipeline phase. Per-message
/// failures ([`MessageError`]) never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to establish session {index}: {source}")]
    SessionEstablish {
        index: usize,
        #[source]
        source: SessionError,
    },

    #[error("Protocol error during discovery: {0}")]
    Protocol(#[source] SessionError),

    #[error("Search failed with status {status}: {reason}")]
    SearchFailed { status: String, reason: String },

    #[error("Report error: {0}")]
    Report(#[from] std::io::Error),
}

impl Error {
    /// Name of the pipeline phase this error aborted.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::SessionEstablish { .. } => "session_establish",
            Self::Protocol(_) | Self::SearchFailed { .. } => "discovery",
            Self::Report(_) => "report",
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse credentials file {path}: {message}")]
    ParseError { path: String, message: String },
}

/// Status of a completed protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    No,
    Bad,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
        };
        write!(f, "{s}")
    }
}

/// Errors raised by a single mailbox session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{command} returned {status}: {text}")]
    Rejected {
        command: String,
        status: CommandStatus,
        text: String,
    },

    #[error("Authentication failed: {0}. Try reducing the number of workers.")]
    AuthFailed(String),

    #[error("Session has no mailbox selected")]
    NotSelected,

    #[error("Session connection closed")]
    Closed,

    #[error("Malformed server response: {0}")]
    Malformed(String),
}

/// Per-message failures. Recovered inside a worker, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Fetch of message {id} failed: {source}")]
    FetchFailed {
        id: MessageId,
        #[source]
        source: SessionError,
    },

    #[error("Extraction from message {id} failed: {source}")]
    ExtractionFailed {
        id: MessageId,
        #[source]
        source: ExtractError,
    },
}

/// Why a fetched message yielded nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("message is empty")]
    Empty,

    #[error("message could not be parsed")]
    Unparseable,
}

/// Result type alias for the scanner.
pub type Result<T> = std::result::Result<T, Error>;
