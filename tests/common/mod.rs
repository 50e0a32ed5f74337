#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use shepherd_lib::application::ports::KeyValueStore;
use shepherd_lib::domain::entities::AttendanceDraft;
use shepherd_lib::domain::value_objects::SyncState;
use shepherd_lib::infrastructure::MemoryKeyValueStore;
use shepherd_lib::shared::AppConfig;
use shepherd_lib::{SyncCoordinator, SyncCoordinatorDeps};

use mocks::RecordingRemote;

pub struct CoordinatorContext {
    pub coordinator: Arc<SyncCoordinator>,
    pub remote: Arc<RecordingRemote>,
    pub store: Arc<MemoryKeyValueStore>,
}

pub fn test_config(namespace: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.namespace = namespace.to_string();
    config.sync.remote_timeout_ms = 2_000;
    config
}

pub fn setup(initial_state: SyncState) -> CoordinatorContext {
    setup_with_config(initial_state, test_config("test"))
}

pub fn setup_with_config(initial_state: SyncState, config: AppConfig) -> CoordinatorContext {
    let store = Arc::new(MemoryKeyValueStore::new());
    let remote = Arc::new(RecordingRemote::new());
    let coordinator = build_coordinator(store.clone(), remote.clone(), config, initial_state);

    CoordinatorContext {
        coordinator,
        remote,
        store,
    }
}

pub fn build_coordinator(
    store: Arc<dyn KeyValueStore>,
    remote: Arc<RecordingRemote>,
    config: AppConfig,
    initial_state: SyncState,
) -> Arc<SyncCoordinator> {
    Arc::new(
        SyncCoordinator::new(SyncCoordinatorDeps {
            store,
            remote,
            config,
            initial_state,
        })
        .expect("coordinator"),
    )
}

pub fn draft(member_id: &str, event_id: &str, date: &str, present: bool) -> AttendanceDraft {
    AttendanceDraft::new(member_id, event_id, date, present)
}

/// 条件が成り立つまで最大 2 秒待つ。
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check().await
}
