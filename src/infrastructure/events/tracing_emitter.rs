use crate::application::ports::sync_events::SyncEventEmitter;
use crate::domain::entities::DrainReport;
use crate::domain::value_objects::SyncState;
use tracing::{info, warn};

/// UI を持たない環境向け。通知内容をログに流すだけ。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSyncEventEmitter;

impl SyncEventEmitter for TracingSyncEventEmitter {
    fn emit_state_change(&self, state: SyncState) -> Result<(), String> {
        info!(state = %state, "sync state changed");
        Ok(())
    }

    fn emit_drain_report(&self, report: &DrainReport) -> Result<(), String> {
        match report.failure_summary() {
            Some(summary) => warn!(
                delivered = report.delivered,
                retained = report.retained,
                abandoned = report.abandoned.len(),
                interrupted = report.interrupted,
                "{summary}"
            ),
            None => info!(
                delivered = report.delivered,
                passes = report.passes,
                duration_ms = report.duration_ms(),
                "pending attendance drained"
            ),
        }
        Ok(())
    }
}
