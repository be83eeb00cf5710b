// ipd/src/stats.rs
//
// Ward occupancy read model. The snapshot is recomputed on demand and
// invalidated by change notifications from the beds and admissions tables;
// the feed is a convenience, not a correctness mechanism, so a lagged
// receiver simply marks the cache dirty.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use models::{Admission, AdmissionStatus, Bed, BedStatus, HospitalError};
use storage_api::{tables, Query, RowStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WardStats {
    pub ward: String,
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub maintenance: usize,
}

pub struct WardStatsAggregator {
    store: Arc<dyn RowStore>,
    cache: RwLock<Option<Vec<WardStats>>>,
    dirty: AtomicBool,
}

impl WardStatsAggregator {
    pub fn new(store: Arc<dyn RowStore>) -> Arc<Self> {
        Arc::new(WardStatsAggregator {
            store,
            cache: RwLock::new(None),
            dirty: AtomicBool::new(true),
        })
    }

    /// Subscribes to the beds and admissions change feeds and marks the
    /// snapshot dirty on every event. Call once after construction.
    pub fn spawn_invalidation(self: &Arc<Self>) {
        for table in [tables::BEDS, tables::ADMISSIONS] {
            let mut rx = self.store.subscribe(table);
            let aggregator = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            debug!(table = %event.table, "ward stats invalidated");
                            aggregator.dirty.store(true, Ordering::Release);
                        }
                        // Missed events still mean "stale".
                        Err(RecvError::Lagged(_)) => {
                            aggregator.dirty.store(true, Ordering::Release);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });
        }
    }

    /// Marks the snapshot stale by hand; used where no invalidation task
    /// is running.
    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// The current per-ward snapshot, recomputed only when dirty.
    pub async fn current(&self) -> Result<Vec<WardStats>, HospitalError> {
        if !self.dirty.load(Ordering::Acquire) {
            if let Some(snapshot) = self.cache.read().await.as_ref() {
                return Ok(snapshot.clone());
            }
        }
        // Cleared before the reads so an event landing mid-recompute
        // re-marks the snapshot stale instead of being erased.
        self.dirty.store(false, Ordering::Release);
        let snapshot = match self.recompute().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.dirty.store(true, Ordering::Release);
                return Err(e);
            }
        };
        *self.cache.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Partitions beds by ward. A bed referenced by an Admitted admission
    /// counts as occupied regardless of its stored status; the remainder
    /// splits into maintenance and available. The three categories always
    /// sum to the ward's total.
    async fn recompute(&self) -> Result<Vec<WardStats>, HospitalError> {
        let bed_rows = self.store.select(Query::table(tables::BEDS)).await?;
        let admission_rows = self
            .store
            .select(
                Query::table(tables::ADMISSIONS)
                    .eq("status", serde_json::json!(AdmissionStatus::Admitted)),
            )
            .await?;

        let mut occupied_ids: HashSet<Uuid> = HashSet::new();
        for row in admission_rows {
            let admission: Admission = serde_json::from_value(row)?;
            occupied_ids.insert(admission.bed_id);
        }

        let mut wards: BTreeMap<String, WardStats> = BTreeMap::new();
        for row in bed_rows {
            let bed: Bed = serde_json::from_value(row)?;
            let entry = wards.entry(bed.ward.clone()).or_insert_with(|| WardStats {
                ward: bed.ward.clone(),
                total: 0,
                available: 0,
                occupied: 0,
                maintenance: 0,
            });
            entry.total += 1;
            if occupied_ids.contains(&bed.id) {
                entry.occupied += 1;
            } else if bed.status == BedStatus::Maintenance {
                entry.maintenance += 1;
            } else {
                entry.available += 1;
            }
        }
        Ok(wards.into_values().collect())
    }
}
