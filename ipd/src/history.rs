// ipd/src/history.rs

use chrono::{DateTime, Duration, Utc};
use models::BedHistoryEntry;
use serde::Serialize;

/// A bed-history entry annotated with its computed duration, ready for
/// display. Open entries are measured against `now`.
#[derive(Debug, Clone, Serialize)]
pub struct BedHistoryView {
    #[serde(flatten)]
    pub entry: BedHistoryEntry,
    pub duration: String,
}

pub fn annotate(entries: Vec<BedHistoryEntry>, now: DateTime<Utc>) -> Vec<BedHistoryView> {
    entries
        .into_iter()
        .map(|entry| {
            let duration = format_duration(entry.duration_until(now));
            BedHistoryView { entry, duration }
        })
        .collect()
}

/// Formats a stay length as whole days and remaining hours, e.g. `1d 2h`.
pub fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    let days = minutes / (24 * 60);
    let hours = (minutes % (24 * 60)) / 60;
    format!("{days}d {hours}h")
}
