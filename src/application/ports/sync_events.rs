use crate::domain::entities::DrainReport;
use crate::domain::value_objects::SyncState;

/// 同期状態の変化を UI 側へ通知する。失敗しても同期処理は止めない。
pub trait SyncEventEmitter: Send + Sync {
    fn emit_state_change(&self, state: SyncState) -> Result<(), String>;
    fn emit_drain_report(&self, report: &DrainReport) -> Result<(), String>;
}
