use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub attendance_table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// リモート呼び出し 1 回あたりの上限。超過はネットワーク障害と同じ扱い。
    pub remote_timeout_ms: u64,
    /// キュー項目あたりの送信試行回数。1 なら 1 回試行した時点でキューから外す。
    pub max_drain_attempts: u32,
    /// オンライン中に失敗した書き込みを再送キューへ退避するか。
    pub queue_failed_online_writes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub namespace: String,
    pub cache_key: String,
    pub queue_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/shepherd.db?mode=rwc".to_string(),
                max_connections: 1,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:54321".to_string(),
                api_key: None,
                attendance_table: "attendance".to_string(),
            },
            sync: SyncConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 15_000,
            max_drain_attempts: 1,
            queue_failed_online_writes: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "shepherd".to_string(),
            cache_key: "attendance_cache".to_string(),
            queue_key: "attendance_pending_queue".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SHEPHERD_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u32("SHEPHERD_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.max(1);
        }

        if let Ok(v) = std::env::var("SHEPHERD_REMOTE_URL") {
            if !v.trim().is_empty() {
                cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("SHEPHERD_REMOTE_API_KEY") {
            let v = v.trim();
            cfg.remote.api_key = if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            };
        }
        if let Ok(v) = std::env::var("SHEPHERD_REMOTE_ATTENDANCE_TABLE") {
            if !v.trim().is_empty() {
                cfg.remote.attendance_table = v.trim().to_string();
            }
        }

        if let Some(value) = env_u64("SHEPHERD_SYNC_REMOTE_TIMEOUT_MS") {
            cfg.sync.remote_timeout_ms = value.max(1);
        }
        if let Some(value) = env_u32("SHEPHERD_SYNC_MAX_DRAIN_ATTEMPTS") {
            cfg.sync.max_drain_attempts = value.max(1);
        }
        if let Ok(v) = std::env::var("SHEPHERD_SYNC_QUEUE_FAILED_ONLINE_WRITES") {
            cfg.sync.queue_failed_online_writes =
                parse_bool(&v, cfg.sync.queue_failed_online_writes);
        }

        if let Ok(v) = std::env::var("SHEPHERD_STORAGE_NAMESPACE") {
            if !v.trim().is_empty() {
                cfg.storage.namespace = v.trim().to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            return Err("Remote base_url must be an http(s) URL".to_string());
        }
        if self.remote.attendance_table.trim().is_empty() {
            return Err("Remote attendance_table must not be empty".to_string());
        }
        if self.sync.remote_timeout_ms == 0 {
            return Err("Sync remote_timeout_ms must be greater than 0".to_string());
        }
        if self.sync.max_drain_attempts == 0 {
            return Err("Sync max_drain_attempts must be greater than 0".to_string());
        }
        if self.storage.cache_key.trim().is_empty() || self.storage.queue_key.trim().is_empty() {
            return Err("Storage keys must not be empty".to_string());
        }
        if self.storage.cache_key == self.storage.queue_key {
            return Err("Storage cache_key and queue_key must differ".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| parse_u32(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}
