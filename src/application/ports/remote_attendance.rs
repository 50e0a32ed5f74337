use crate::domain::entities::{
    AttendanceFilter, AttendanceRecord, AttendanceUpdate, SyncedAttendance,
};
use crate::domain::value_objects::{QueueEntryId, RemoteAttendanceId};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 出席データの正本を持つリモートサービス。
#[async_trait]
pub trait RemoteAttendanceService: Send + Sync {
    /// メンバー名・イベント名を結合し、`attendance_date` の降順で返す。
    async fn select(
        &self,
        filter: Option<&AttendanceFilter>,
    ) -> Result<Vec<SyncedAttendance>, AppError>;

    /// `idempotency_key` はキュー経由の再送を重複登録させないためのキー。
    async fn insert(
        &self,
        record: &AttendanceRecord,
        idempotency_key: Option<&QueueEntryId>,
    ) -> Result<(), AppError>;

    /// (member_id, event_id, attendance_date) をキーにまとめて upsert する。
    async fn upsert(&self, records: &[AttendanceRecord]) -> Result<(), AppError>;

    async fn update(
        &self,
        id: &RemoteAttendanceId,
        update: &AttendanceUpdate,
    ) -> Result<(), AppError>;

    async fn delete(&self, id: &RemoteAttendanceId) -> Result<(), AppError>;
}
