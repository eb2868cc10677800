//! Bridging counter resets.
//!
//! Right after an interface restart the live counters only hold the traffic
//! seen since the restart. Adding the last durably known cumulative totals
//! (the baseline) to them yields a continuous series.

use crate::usage::{PeerUsage, UsageMap};

/// Merge freshly observed usage with the baseline.
///
/// Without a baseline the observation is returned as is. Otherwise every
/// observed peer that also has a baseline entry gets the baseline counters
/// added. Peers that only exist in the baseline are dropped: only currently
/// configured peers are reported.
///
/// Sums saturate at `u64::MAX`.
pub fn merge(observed: &UsageMap, baseline: Option<&UsageMap>) -> UsageMap {
    let Some(baseline) = baseline else {
        return observed.clone();
    };

    observed
        .iter()
        .map(|(key, usage)| {
            let merged = match baseline.get(key) {
                Some(previous) => PeerUsage {
                    public_key: usage.public_key.clone(),
                    upload: usage.upload.saturating_add(previous.upload),
                    download: usage.download.saturating_add(previous.download),
                },
                None => usage.clone(),
            };
            (key.clone(), merged)
        })
        .collect()
}
