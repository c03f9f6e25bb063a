//! Merge per-worker results into the global sender → targets mapping.

use std::collections::{BTreeMap, BTreeSet};

use crate::scan::types::{GlobalResult, LocalResult, SenderIdentity, UnsubscribeTarget};

/// Union every local result by sender.
///
/// Senders whose combined target set is empty are dropped. The outcome does
/// not depend on the order of `locals`.
pub fn aggregate<I>(locals: I) -> GlobalResult
where
    I: IntoIterator<Item = LocalResult>,
{
    let mut merged: BTreeMap<SenderIdentity, BTreeSet<UnsubscribeTarget>> = BTreeMap::new();
    for local in locals {
        for (sender, targets) in local.into_entries() {
            merged.entry(sender).or_default().extend(targets);
        }
    }
    merged.retain(|_, targets| !targets.is_empty());
    GlobalResult::from_entries(merged)
}
