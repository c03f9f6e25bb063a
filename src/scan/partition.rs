//! Stride partitioning of discovered message ids across workers.

use crate::scan::types::MessageId;

/// Split `ids` into exactly `workers` sub-sequences by stride.
///
/// Part `i` holds every id whose position is congruent to `i` modulo
/// `workers`, in input order. Parts may be empty when there are fewer
/// ids than workers. A worker count of zero yields no parts.
pub fn stride_partition(ids: &[MessageId], workers: usize) -> Vec<Vec<MessageId>> {
    let mut parts: Vec<Vec<MessageId>> = (0..workers)
        .map(|_| Vec::with_capacity(ids.len().div_ceil(workers.max(1))))
        .collect();
    if workers == 0 {
        return parts;
    }
    for (pos, id) in ids.iter().enumerate() {
        parts[pos % workers].push(id.clone());
    }
    parts
}
