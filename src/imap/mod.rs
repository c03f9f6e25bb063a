//! IMAP over TLS: the mailbox session used by the scanner.
//!
//! Blocking I/O on purpose: each session is driven from its own
//! `spawn_blocking` thread and is never shared.

pub mod connection;
pub mod session;

pub use session::{ImapConnector, ImapSession, ImapState};
