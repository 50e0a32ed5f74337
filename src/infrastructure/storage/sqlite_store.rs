use crate::application::ports::key_value_store::KeyValueStore;
use crate::infrastructure::database::ConnectionPool;
use crate::shared::config::DatabaseConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// SQLite の `kv_store` テーブルを使った永続 KV ストア。
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: ConnectionPool,
}

impl SqliteKeyValueStore {
    /// 接続してマイグレーションまで済ませる。
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = ConnectionPool::from_config(config).await?;
        pool.migrate().await?;
        debug!(url = %config.url, "kv store ready");
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = ConnectionPool::from_memory().await?;
        pool.migrate().await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(self.pool.get_pool())
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(self.pool.get_pool())
            .await?;

        Ok(())
    }
}
