//! Change detection between successive snapshots

use crate::models::Snapshot;

/// Whether `current` differs from the last processed snapshot.
///
/// Comparison is structural and order-sensitive: a reordering of otherwise
/// identical rows counts as a change. No previous snapshot always counts as
/// changed.
pub fn has_changed(previous: Option<&Snapshot>, current: &Snapshot) -> bool {
    match previous {
        None => true,
        Some(previous) => previous != current,
    }
}
