use crate::application::ports::key_value_store::KeyValueStore;
use crate::domain::entities::{
    AbandonedEntry, AttendanceRecord, DeliveryOutcome, QueueEntry, SettleSummary,
};
use crate::domain::value_objects::{QueueEntryId, StorageKey};
use crate::shared::error::AppError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 未送信の出席レコードを FIFO で永続化するキュー。
///
/// 読み込み・変更・保存はすべて `gate` を保持したまま行うため、
/// ドレイン中の `enqueue` が `settle` に上書きされることはない。
pub struct PendingWriteQueue {
    store: Arc<dyn KeyValueStore>,
    key: StorageKey,
    gate: Mutex<()>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredQueue {
    Entries(Vec<QueueEntry>),
    // ID を持たない旧形式
    Records(Vec<AttendanceRecord>),
}

impl PendingWriteQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, key: StorageKey) -> Self {
        Self {
            store,
            key,
            gate: Mutex::new(()),
        }
    }

    /// 末尾に追加し、保存が完了してから返る。
    pub async fn enqueue(&self, record: AttendanceRecord) -> Result<QueueEntry, AppError> {
        self.enqueue_entry(QueueEntry::new(record)).await
    }

    /// 採番済みのエントリをそのまま追加する。オンライン送信に失敗した書き込みの退避用。
    pub async fn enqueue_entry(&self, entry: QueueEntry) -> Result<QueueEntry, AppError> {
        let _guard = self.gate.lock().await;

        let mut entries = self.read().await?;
        entries.push(entry.clone());
        self.write(&entries).await?;

        info!(
            entry_id = %entry.entry_id,
            member_id = %entry.record.member_id,
            pending = entries.len(),
            "attendance queued for later delivery"
        );
        Ok(entry)
    }

    /// まとめて 1 回の保存で追加する。途中までしか入らないことはない。
    pub async fn enqueue_all(
        &self,
        records: Vec<AttendanceRecord>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.gate.lock().await;

        let mut entries = self.read().await?;
        let added: Vec<QueueEntry> = records.into_iter().map(QueueEntry::new).collect();
        entries.extend(added.iter().cloned());
        self.write(&entries).await?;

        info!(
            added = added.len(),
            pending = entries.len(),
            "attendance batch queued for later delivery"
        );
        Ok(added)
    }

    /// 中身を削除せずに先頭から返す。読めない場合は空として扱う。
    pub async fn drain_all(&self) -> Vec<QueueEntry> {
        let _guard = self.gate.lock().await;
        match self.read().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key = %self.key, error = %e, "pending queue unreadable; nothing to drain");
                Vec::new()
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.drain_all().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        let _guard = self.gate.lock().await;
        self.store.remove(self.key.as_str()).await?;
        debug!(key = %self.key, "pending queue cleared");
        Ok(())
    }

    /// ドレイン 1 パス分の結果を反映する。
    ///
    /// - 送信済みの項目は取り除く
    /// - 失敗した項目は `attempts` を加算し、`max_attempts` に達したら取り除く
    /// - `outcomes` に含まれない項目（ドレイン中に追加されたもの）には触れない
    ///
    /// 残る項目の順序は変えない。
    pub async fn settle(
        &self,
        outcomes: &[DeliveryOutcome],
        max_attempts: u32,
    ) -> Result<SettleSummary, AppError> {
        let _guard = self.gate.lock().await;

        let by_id: HashMap<&QueueEntryId, &DeliveryOutcome> = outcomes
            .iter()
            .map(|outcome| (outcome.entry_id(), outcome))
            .collect();

        let entries = self.read().await?;
        let mut summary = SettleSummary::default();
        let mut kept = Vec::with_capacity(entries.len());

        for mut entry in entries {
            match by_id.get(&entry.entry_id) {
                None => kept.push(entry),
                Some(DeliveryOutcome::Delivered(_)) => summary.delivered += 1,
                Some(DeliveryOutcome::Failed { error, .. }) => {
                    entry.attempts = entry.attempts.saturating_add(1);
                    entry.last_error = Some(error.clone());
                    if entry.attempts >= max_attempts.max(1) {
                        summary.abandoned.push(AbandonedEntry {
                            entry_id: entry.entry_id,
                            record: entry.record,
                            attempts: entry.attempts,
                            last_error: error.clone(),
                        });
                    } else {
                        summary.retained += 1;
                        kept.push(entry);
                    }
                }
            }
        }

        summary.remaining = kept.len() as u32;
        if kept.is_empty() {
            self.store.remove(self.key.as_str()).await?;
        } else {
            self.write(&kept).await?;
        }

        debug!(
            delivered = summary.delivered,
            retained = summary.retained,
            abandoned = summary.abandoned.len(),
            remaining = summary.remaining,
            "pending queue settled"
        );
        Ok(summary)
    }

    async fn read(&self) -> Result<Vec<QueueEntry>, AppError> {
        let Some(payload) = self.store.get(self.key.as_str()).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<StoredQueue>(&payload)? {
            StoredQueue::Entries(entries) => Ok(entries),
            StoredQueue::Records(records) => {
                // 読むたびに ID が変わらないよう、その場で新形式に書き換える
                let entries: Vec<QueueEntry> = records.into_iter().map(QueueEntry::new).collect();
                self.write(&entries).await?;
                info!(key = %self.key, migrated = entries.len(), "pending queue migrated");
                Ok(entries)
            }
        }
    }

    async fn write(&self, entries: &[QueueEntry]) -> Result<(), AppError> {
        let payload = serde_json::to_string(entries)?;
        self.store.set(self.key.as_str(), &payload).await
    }
}
