use crate::domain::entities::queue_entry::AbandonedEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 1 回のドレイン（複数パスを含む）の集計結果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub passes: u32,
    pub attempted: u32,
    pub delivered: u32,
    pub retained: u32,
    pub abandoned: Vec<AbandonedEntry>,
    pub remaining: u32,
    /// 途中で接続が切れてパスを打ち切ったか。
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DrainReport {
    pub fn begin(started_at: DateTime<Utc>) -> Self {
        Self {
            passes: 0,
            attempted: 0,
            delivered: 0,
            retained: 0,
            abandoned: Vec::new(),
            remaining: 0,
            interrupted: false,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn failed_count(&self) -> u32 {
        self.retained + self.abandoned.len() as u32
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn duration_ms(&self) -> u64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    /// 利用者に見せる集約メッセージ。失敗がなければ None。
    pub fn failure_summary(&self) -> Option<String> {
        if !self.has_failures() {
            return None;
        }
        let mut parts = Vec::new();
        if !self.abandoned.is_empty() {
            parts.push(format!(
                "{} attendance record(s) could not be delivered and were discarded",
                self.abandoned.len()
            ));
        }
        if self.retained > 0 {
            parts.push(format!(
                "{} attendance record(s) will be retried on the next reconnect",
                self.retained
            ));
        }
        Some(parts.join("; "))
    }
}
