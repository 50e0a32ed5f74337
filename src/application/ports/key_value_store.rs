use crate::shared::error::AppError;
use async_trait::async_trait;

/// 端末ローカルの永続 KV ストア。プロセス再起動後も値が残ること。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}
