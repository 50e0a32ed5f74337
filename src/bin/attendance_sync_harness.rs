use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shepherd_lib::application::ports::{ConnectivityObserver, RemoteAttendanceService};
use shepherd_lib::domain::entities::{
    AttendanceDraft, AttendanceFilter, AttendanceRecord, AttendanceUpdate, DrainReport,
    SyncedAttendance,
};
use shepherd_lib::domain::value_objects::{EventId, QueueEntryId, RemoteAttendanceId, SyncState};
use shepherd_lib::infrastructure::{
    RestAttendanceService, SqliteKeyValueStore, TracingSyncEventEmitter, WatchConnectivity,
};
use shepherd_lib::shared::{AppConfig, AppError, DrainMetricsSnapshot};
use shepherd_lib::{SyncCoordinator, SyncCoordinatorDeps};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
struct HarnessConfig {
    records: u32,
    event_id: String,
    attendance_date: String,
    fail_every: u64,
    reset: bool,
    use_rest_remote: bool,
    summary_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct HarnessSummary {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    remote: &'static str,
    queued_offline: usize,
    remote_rows: Option<usize>,
    event_rows: usize,
    final_state: SyncState,
    report: Option<DrainReport>,
    metrics: DrainMetricsSnapshot,
}

/// 手元で完結する擬似リモート。`fail_every` 件ごとに 1 件失敗させる。
#[derive(Default)]
struct SimulatedRemote {
    rows: RwLock<Vec<SyncedAttendance>>,
    inserts: AtomicU64,
    next_id: AtomicU64,
    fail_every: u64,
}

impl SimulatedRemote {
    fn new(fail_every: u64) -> Self {
        Self {
            fail_every,
            ..Self::default()
        }
    }

    fn to_row(&self, record: &AttendanceRecord) -> Result<SyncedAttendance, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut row = SyncedAttendance::new(record.clone());
        row.id = Some(RemoteAttendanceId::new(id.to_string()).map_err(AppError::Internal)?);
        row.created_at = Some(Utc::now());
        row.event_title = Some("Harness Event".to_string());
        Ok(row)
    }
}

#[async_trait]
impl RemoteAttendanceService for SimulatedRemote {
    async fn select(
        &self,
        filter: Option<&AttendanceFilter>,
    ) -> Result<Vec<SyncedAttendance>, AppError> {
        let mut rows: Vec<SyncedAttendance> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.record.attendance_date.cmp(&a.record.attendance_date));
        Ok(rows)
    }

    async fn insert(
        &self,
        record: &AttendanceRecord,
        idempotency_key: Option<&QueueEntryId>,
    ) -> Result<(), AppError> {
        let count = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && count % self.fail_every == 0 {
            return Err(AppError::Remote {
                status: 503,
                message: format!("simulated outage on insert #{count}"),
            });
        }

        let row = self.to_row(record)?;
        self.rows.write().await.push(row);
        info!(
            member_id = %record.member_id,
            idempotency_key = idempotency_key.map(|k| k.as_str()).unwrap_or("-"),
            "simulated insert"
        );
        Ok(())
    }

    async fn upsert(&self, records: &[AttendanceRecord]) -> Result<(), AppError> {
        let mut rows = self.rows.write().await;
        for record in records {
            let key = record.natural_key();
            match rows.iter_mut().find(|row| row.record.natural_key() == key) {
                Some(row) => row.record = record.clone(),
                None => rows.push(self.to_row(record)?),
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        id: &RemoteAttendanceId,
        update: &AttendanceUpdate,
    ) -> Result<(), AppError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id.as_ref() == Some(id))
            .ok_or_else(|| AppError::NotFound(format!("attendance {id}")))?;
        if let Some(present) = update.present {
            row.record.present = present;
        }
        if let Some(notes) = &update.notes {
            row.record.notes = Some(notes.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: &RemoteAttendanceId) -> Result<(), AppError> {
        self.rows.write().await.retain(|row| row.id.as_ref() != Some(id));
        Ok(())
    }
}

fn env_string(key: &str, default_value: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default_value.to_string())
}

fn env_u64(key: &str, default_value: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn build_config() -> HarnessConfig {
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
    HarnessConfig {
        records: env_u64("SHEPHERD_HARNESS_RECORDS", 3).min(u64::from(u32::MAX)) as u32,
        event_id: env_string("SHEPHERD_HARNESS_EVENT_ID", "harness-event"),
        attendance_date: env_string("SHEPHERD_HARNESS_DATE", &today),
        fail_every: env_u64("SHEPHERD_HARNESS_FAIL_EVERY", 0),
        reset: env_bool("SHEPHERD_HARNESS_RESET"),
        use_rest_remote: std::env::var("SHEPHERD_REMOTE_URL")
            .map(|value| !value.trim().is_empty())
            .unwrap_or(false),
        summary_path: std::env::var("SHEPHERD_HARNESS_SUMMARY_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from),
    }
}

// sqlite:path?mode=rwc の親ディレクトリを用意する
fn ensure_database_dir(url: &str) -> anyhow::Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

fn write_summary(path: &Path, summary: &HarnessSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(summary)?)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shepherd_lib::init_logging();

    let app_config = AppConfig::from_env();
    app_config
        .validate()
        .map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;
    let cfg = build_config();
    let started_at = Utc::now();

    ensure_database_dir(&app_config.database.url)?;
    let store = SqliteKeyValueStore::connect(&app_config.database)
        .await
        .context("failed to open key-value store")?;
    // SHEPHERD_REMOTE_URL があれば実サービスへ、なければ擬似リモートへ送る
    let (remote, remote_kind): (Arc<dyn RemoteAttendanceService>, &'static str) =
        if cfg.use_rest_remote {
            let service = RestAttendanceService::new(&app_config.remote, &app_config.sync)
                .context("failed to build REST remote")?;
            info!(base_url = %app_config.remote.base_url, "using REST attendance service");
            (Arc::new(service), "rest")
        } else {
            (Arc::new(SimulatedRemote::new(cfg.fail_every)), "simulated")
        };
    let event_id = EventId::new(cfg.event_id.clone())
        .map_err(|err| anyhow::anyhow!("invalid SHEPHERD_HARNESS_EVENT_ID: {err}"))?;
    let connectivity = Arc::new(WatchConnectivity::new(false));

    let coordinator = Arc::new(
        SyncCoordinator::new(SyncCoordinatorDeps {
            store: Arc::new(store.clone()),
            remote: Arc::clone(&remote),
            config: app_config,
            initial_state: SyncState::from_connected(connectivity.is_connected()),
        })?
        .with_event_emitter(Arc::new(TracingSyncEventEmitter)),
    );

    if cfg.reset {
        coordinator
            .clear_local_data()
            .await
            .context("failed to clear local attendance data")?;
    }

    info!(
        records = cfg.records,
        event_id = %cfg.event_id,
        date = %cfg.attendance_date,
        leftover = coordinator.pending_count().await,
        "recording attendance offline"
    );
    for index in 1..=cfg.records {
        let draft = AttendanceDraft::new(
            format!("harness-member-{index}"),
            cfg.event_id.clone(),
            cfg.attendance_date.clone(),
            index % 4 != 0,
        );
        coordinator
            .record_attendance(draft)
            .await
            .with_context(|| format!("failed to record attendance #{index}"))?;
    }
    let queued_offline = coordinator.pending_count().await;

    connectivity.set_connected(true);
    let report = coordinator
        .handle_connectivity_change(connectivity.is_connected())
        .await;

    let summary = HarnessSummary {
        started_at,
        finished_at: Utc::now(),
        remote: remote_kind,
        queued_offline,
        remote_rows: remote.select(None).await.ok().map(|rows| rows.len()),
        event_rows: coordinator
            .fetch_attendance(Some(AttendanceFilter::for_event(event_id)))
            .await
            .len(),
        final_state: coordinator.state().await,
        report,
        metrics: coordinator.metrics(),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(path) = &cfg.summary_path {
        write_summary(path, &summary)?;
        info!(path = %path.display(), "summary written");
    }

    store.close().await;
    Ok(())
}
