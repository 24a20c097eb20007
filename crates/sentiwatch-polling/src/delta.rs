//! Baseline arithmetic for new-item detection.
//!
//! A source's baseline is the item count observed by its last completed
//! successful fetch. Failed fetches never move the baseline, so the next
//! success reports everything that arrived across the outage.

/// Number of new items given the current count and the baseline.
///
/// Clamped at zero: a shrinking count (items deleted upstream) reports no
/// new items rather than a negative number.
pub fn new_item_count(current: u64, baseline: u64) -> u64 {
    current.saturating_sub(baseline)
}

/// The baseline after a completed successful fetch.
pub fn advance_baseline(current: u64) -> u64 {
    current
}
