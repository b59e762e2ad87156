use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::schedule::{BlockedSet, Schedule};

/// A decoded schedule together with the bytes it came from
#[derive(Debug)]
pub struct ActiveSchedule {
    pub schedule: Schedule,
    pub raw: Vec<u8>,
    pub version: i64,
}

/// Owner of the single active schedule
///
/// Installing swaps an `Arc` under the write lock. Readers clone the `Arc`
/// under the read lock and evaluate after releasing it, so a reload racing
/// with an evaluation never exposes a partially replaced or dropped schedule.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    active: RwLock<Option<Arc<ActiveSchedule>>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active schedule, dropping the previous one
    pub async fn install(&self, schedule: Schedule, raw: Vec<u8>, version: i64) {
        let next = Arc::new(ActiveSchedule {
            schedule,
            raw,
            version,
        });
        *self.active.write().await = Some(next);
    }

    /// Drop the active schedule, if any
    pub async fn clear(&self) {
        *self.active.write().await = None;
    }

    pub async fn is_active(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Version of the installed schedule's source file
    #[cfg(test)]
    pub async fn version(&self) -> Option<i64> {
        self.snapshot().await.map(|a| a.version)
    }

    /// Devices blocked at `at`; empty when no schedule is active
    pub async fn evaluate(&self, at: DateTime<Utc>) -> BlockedSet {
        self.evaluate_active(at).await.unwrap_or_default()
    }

    /// Devices blocked at `at`, or `None` when no schedule is active
    pub async fn evaluate_active(&self, at: DateTime<Utc>) -> Option<BlockedSet> {
        self.snapshot().await.map(|a| a.schedule.blocked_at(at))
    }

    /// Raw bytes of the last successfully installed schedule
    pub async fn current_raw(&self) -> Option<Vec<u8>> {
        self.snapshot().await.map(|a| a.raw.clone())
    }

    async fn snapshot(&self) -> Option<Arc<ActiveSchedule>> {
        self.active.read().await.clone()
    }
}
