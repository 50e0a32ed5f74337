pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::services::{RecordOutcome, SyncCoordinator, SyncCoordinatorDeps};
pub use shared::{AppConfig, AppError};

/// ログ出力を初期化する。既に初期化済みなら何もしない。
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shepherd_lib=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
