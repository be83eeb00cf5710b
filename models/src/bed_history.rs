// models/src/bed_history.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stay of an admission in one bed.
///
/// Invariant: per admission the intervals are contiguous and
/// non-overlapping; exactly one entry has `to_time == None` while the
/// admission is active, and none once it is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedHistoryEntry {
    pub id: Uuid,
    pub admission_id: Uuid,
    pub bed_id: Uuid,
    pub from_time: DateTime<Utc>,
    pub to_time: Option<DateTime<Utc>>,
}

impl BedHistoryEntry {
    pub fn open(admission_id: Uuid, bed_id: Uuid, from_time: DateTime<Utc>) -> Self {
        BedHistoryEntry {
            id: Uuid::new_v4(),
            admission_id,
            bed_id,
            from_time,
            to_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.to_time.is_none()
    }

    /// Time spent in the bed; open entries run until `now`.
    pub fn duration_until(&self, now: DateTime<Utc>) -> Duration {
        self.to_time.unwrap_or(now) - self.from_time
    }
}
