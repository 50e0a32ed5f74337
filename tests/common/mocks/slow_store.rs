use std::time::Duration;

use async_trait::async_trait;
use shepherd_lib::application::ports::KeyValueStore;
use shepherd_lib::infrastructure::MemoryKeyValueStore;
use shepherd_lib::shared::AppError;

/// 読み書きのたびに待たせる KV ストア。ドレイン後処理の隙間を広げるのに使う。
#[derive(Clone, Default)]
pub struct SlowStore {
    inner: MemoryKeyValueStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryKeyValueStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        tokio::time::sleep(self.delay).await;
        self.inner.remove(key).await
    }
}
