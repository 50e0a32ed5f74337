use crate::domain::entities::attendance::AttendanceRecord;
use crate::domain::value_objects::QueueEntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 未送信の出席レコード。キュー投入時点の内容を保持する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub entry_id: QueueEntryId,
    pub record: AttendanceRecord,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn new(record: AttendanceRecord) -> Self {
        Self {
            entry_id: QueueEntryId::generate(),
            record,
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// まだ一度も送信を試みていない項目か。
    pub fn is_fresh(&self) -> bool {
        self.attempts == 0
    }
}

/// ドレイン中の 1 項目分の送信結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered(QueueEntryId),
    Failed { entry_id: QueueEntryId, error: String },
}

impl DeliveryOutcome {
    pub fn entry_id(&self) -> &QueueEntryId {
        match self {
            DeliveryOutcome::Delivered(id) => id,
            DeliveryOutcome::Failed { entry_id, .. } => entry_id,
        }
    }
}

/// 試行上限に達してキューから外された項目。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbandonedEntry {
    pub entry_id: QueueEntryId,
    pub record: AttendanceRecord,
    pub attempts: u32,
    pub last_error: String,
}

/// `PendingWriteQueue::settle` の結果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettleSummary {
    pub delivered: u32,
    pub retained: u32,
    pub abandoned: Vec<AbandonedEntry>,
    pub remaining: u32,
}
