//! Data model shared by the scan pipeline stages.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Raw value of a message's `From` header, used as the aggregation key.
pub type SenderIdentity = String;

/// A URL believed to be an unsubscribe action. Not validated.
pub type UnsubscribeTarget = String;

/// Opaque, server-assigned identifier of one message in a session's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One fetched message, headers and body, exactly as the server sent it.
#[derive(Debug, Clone)]
pub struct RawMessage {
    bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Sender → unsubscribe targets accumulated by one worker.
///
/// Owned by exactly one worker while it runs; handed to the aggregator
/// by value once the worker is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalResult {
    entries: BTreeMap<SenderIdentity, BTreeSet<UnsubscribeTarget>>,
}

impl LocalResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `links` into the entry for `sender`, creating it if absent.
    pub fn record<I>(&mut self, sender: SenderIdentity, links: I)
    where
        I: IntoIterator<Item = UnsubscribeTarget>,
    {
        self.entries.entry(sender).or_default().extend(links);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, sender: &str) -> Option<&BTreeSet<UnsubscribeTarget>> {
        self.entries.get(sender)
    }

    pub(crate) fn into_entries(
        self,
    ) -> impl Iterator<Item = (SenderIdentity, BTreeSet<UnsubscribeTarget>)> {
        self.entries.into_iter()
    }
}

/// The pipeline's terminal artifact: every sender with at least one target.
///
/// Only the aggregator constructs one; it is read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GlobalResult {
    entries: BTreeMap<SenderIdentity, BTreeSet<UnsubscribeTarget>>,
}

impl GlobalResult {
    pub(crate) fn from_entries(
        entries: BTreeMap<SenderIdentity, BTreeSet<UnsubscribeTarget>>,
    ) -> Self {
        Self { entries }
    }

    pub fn get(&self, sender: &str) -> Option<&BTreeSet<UnsubscribeTarget>> {
        self.entries.get(sender)
    }

    pub fn contains_sender(&self, sender: &str) -> bool {
        self.entries.contains_key(sender)
    }

    pub fn senders(&self) -> impl Iterator<Item = &SenderIdentity> {
        self.entries.keys()
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&SenderIdentity, &BTreeSet<UnsubscribeTarget>)> {
        self.entries.iter()
    }

    /// Number of senders.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of distinct (sender, target) pairs.
    pub fn target_count(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_unions_into_existing_entry() {
        let mut local = LocalResult::new();
        local.record("a@x.com".into(), vec!["http://x.com/u1".to_string()]);
        local.record(
            "a@x.com".into(),
            vec!["http://x.com/u1".to_string(), "http://x.com/u2".to_string()],
        );

        assert_eq!(local.len(), 1);
        assert_eq!(local.get("a@x.com").map(BTreeSet::len), Some(2));
    }

    #[test]
    fn record_keeps_empty_entries_locally() {
        let mut local = LocalResult::new();
        local.record("quiet@x.com".into(), Vec::new());
        assert_eq!(local.get("quiet@x.com").map(BTreeSet::len), Some(0));
    }

    #[test]
    fn global_result_serializes_as_object() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "a@x.com".to_string(),
            BTreeSet::from(["http://x.com/u1".to_string()]),
        );
        let global = GlobalResult::from_entries(entries);
        let json = serde_json::to_string(&global).unwrap();
        assert_eq!(json, r#"{"a@x.com":["http://x.com/u1"]}"#);
    }

    #[test]
    fn message_id_displays_raw_token() {
        assert_eq!(MessageId::from("42").to_string(), "42");
    }
}
