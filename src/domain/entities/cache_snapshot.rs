use crate::domain::entities::attendance::SyncedAttendance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 最後に取得に成功した出席一覧。取得のたびに丸ごと置き換える。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub records: Vec<SyncedAttendance>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheSnapshot {
    pub fn new(records: Vec<SyncedAttendance>) -> Self {
        Self {
            records,
            fetched_at: Utc::now(),
        }
    }
}
