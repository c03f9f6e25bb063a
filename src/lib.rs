//! Unsub Scan: find every unsubscribe link in a mailbox, grouped by sender.

pub mod config;
pub mod error;
pub mod imap;
pub mod report;
pub mod scan;

pub use error::{Error, Result};
