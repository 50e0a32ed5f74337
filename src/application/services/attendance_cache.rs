use crate::application::ports::key_value_store::KeyValueStore;
use crate::domain::entities::{CacheSnapshot, SyncedAttendance};
use crate::domain::value_objects::StorageKey;
use crate::shared::error::AppError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// 直近に取得できた出席一覧をオフライン表示用に保持する。
///
/// 読み書きの失敗は呼び出し側へ返さず、ログに残して「データなし」として扱う。
pub struct AttendanceCache {
    store: Arc<dyn KeyValueStore>,
    key: StorageKey,
}

// 以前は一覧をそのまま配列で保存していた
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCache {
    Snapshot(CacheSnapshot),
    Records(Vec<SyncedAttendance>),
}

impl AttendanceCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: StorageKey) -> Self {
        Self { store, key }
    }

    pub async fn load(&self) -> Vec<SyncedAttendance> {
        self.snapshot()
            .await
            .map(|snapshot| snapshot.records)
            .unwrap_or_default()
    }

    /// 取得時刻付きのスナップショット。保存されていなければ None。
    pub async fn snapshot(&self) -> Option<CacheSnapshot> {
        match self.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    key = %self.key,
                    error = %e,
                    "attendance cache unreadable; treating as empty"
                );
                None
            }
        }
    }

    pub async fn save(&self, records: &[SyncedAttendance]) {
        let snapshot = CacheSnapshot::new(records.to_vec());
        let result = match serde_json::to_string(&snapshot) {
            Ok(payload) => self.store.set(self.key.as_str(), &payload).await,
            Err(e) => Err(AppError::from(e)),
        };

        match result {
            Ok(()) => debug!(key = %self.key, records = records.len(), "attendance cache saved"),
            Err(e) => warn!(key = %self.key, error = %e, "failed to save attendance cache"),
        }
    }

    pub async fn invalidate(&self) {
        if let Err(e) = self.store.remove(self.key.as_str()).await {
            warn!(key = %self.key, error = %e, "failed to invalidate attendance cache");
        }
    }

    async fn read(&self) -> Result<Option<CacheSnapshot>, AppError> {
        let Some(payload) = self.store.get(self.key.as_str()).await? else {
            return Ok(None);
        };

        let snapshot = match serde_json::from_str::<StoredCache>(&payload)? {
            StoredCache::Snapshot(snapshot) => snapshot,
            StoredCache::Records(records) => CacheSnapshot::new(records),
        };
        Ok(Some(snapshot))
    }
}
