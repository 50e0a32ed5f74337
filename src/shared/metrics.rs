use crate::domain::entities::DrainReport;
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const UNSET_TS: u64 = 0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcomeStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DrainMetricsSnapshot {
    pub total_drains: u64,
    pub total_delivered: u64,
    pub total_retained: u64,
    pub total_abandoned: u64,
    pub consecutive_failure: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<DrainOutcomeStatus>,
    pub last_attempted: Option<u32>,
    pub last_passes: Option<u32>,
    pub last_duration_ms: Option<u64>,
    pub last_interrupted: Option<bool>,
}

#[derive(Debug, Default, Clone)]
struct LastDrainMetadata {
    last_outcome: Option<DrainOutcomeStatus>,
    attempted: Option<u32>,
    passes: Option<u32>,
    duration_ms: Option<u64>,
    interrupted: Option<bool>,
}

/// コーディネーター単位のドレイン集計。インスタンスごとに独立している。
#[derive(Debug)]
pub struct DrainMetrics {
    drains: AtomicU64,
    delivered: AtomicU64,
    retained: AtomicU64,
    abandoned: AtomicU64,
    consecutive_failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    metadata: Mutex<LastDrainMetadata>,
}

impl DrainMetrics {
    pub fn new() -> Self {
        Self {
            drains: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            retained: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(UNSET_TS),
            last_failure_ms: AtomicU64::new(UNSET_TS),
            metadata: Mutex::new(LastDrainMetadata::default()),
        }
    }

    pub fn record(&self, report: &DrainReport) -> DrainMetricsSnapshot {
        let status = if report.has_failures() || report.interrupted {
            DrainOutcomeStatus::Failure
        } else {
            DrainOutcomeStatus::Success
        };

        self.drains.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(u64::from(report.delivered), Ordering::Relaxed);
        self.retained
            .fetch_add(u64::from(report.retained), Ordering::Relaxed);
        self.abandoned
            .fetch_add(report.abandoned.len() as u64, Ordering::Relaxed);

        match status {
            DrainOutcomeStatus::Success => {
                self.last_success_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            DrainOutcomeStatus::Failure => {
                self.last_failure_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Ok(mut guard) = self.metadata.lock() {
            guard.last_outcome = Some(status);
            guard.attempted = Some(report.attempted);
            guard.passes = Some(report.passes);
            guard.duration_ms = Some(report.duration_ms());
            guard.interrupted = Some(report.interrupted);
        }

        self.snapshot()
    }

    pub fn snapshot(&self) -> DrainMetricsSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        DrainMetricsSnapshot {
            total_drains: self.drains.load(Ordering::Relaxed),
            total_delivered: self.delivered.load(Ordering::Relaxed),
            total_retained: self.retained.load(Ordering::Relaxed),
            total_abandoned: self.abandoned.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_success_ms: timestamp_to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: timestamp_to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: metadata.last_outcome,
            last_attempted: metadata.attempted,
            last_passes: metadata.passes,
            last_duration_ms: metadata.duration_ms,
            last_interrupted: metadata.interrupted,
        }
    }
}

impl Default for DrainMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(UNSET_TS)
}

#[inline]
pub fn timestamp_to_option(value: u64) -> Option<u64> {
    if value == UNSET_TS { None } else { Some(value) }
}
