pub mod config;
pub mod error;
pub mod metrics;

pub use config::{AppConfig, DatabaseConfig, RemoteConfig, StorageConfig, SyncConfig};
pub use error::{AppError, Result};
pub use metrics::{DrainMetrics, DrainMetricsSnapshot};
