use crate::application::ports::connectivity::ConnectivityObserver;
use crate::application::ports::key_value_store::KeyValueStore;
use crate::application::ports::remote_attendance::RemoteAttendanceService;
use crate::application::ports::sync_events::SyncEventEmitter;
use crate::application::services::attendance_cache::AttendanceCache;
use crate::application::services::pending_write_queue::PendingWriteQueue;
use crate::domain::entities::{
    AttendanceDraft, AttendanceFilter, AttendanceKey, AttendanceRecord, AttendanceUpdate,
    CacheSnapshot, DeliveryOutcome, DrainReport, QueueEntry, SyncedAttendance,
};
use crate::domain::value_objects::{QueueEntryId, RemoteAttendanceId, StorageKey, SyncState};
use crate::shared::config::{AppConfig, SyncConfig};
use crate::shared::error::AppError;
use crate::shared::metrics::{DrainMetrics, DrainMetricsSnapshot};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 書き込みがリモートに届いたのか、キューに積まれたのか。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Delivered,
    Queued,
}

pub struct SyncCoordinatorDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub remote: Arc<dyn RemoteAttendanceService>,
    pub config: AppConfig,
    pub initial_state: SyncState,
}

/// 出席データの読み書きを、接続状態に応じてリモート・キャッシュ・キューへ振り分ける。
pub struct SyncCoordinator {
    remote: Arc<dyn RemoteAttendanceService>,
    cache: AttendanceCache,
    queue: PendingWriteQueue,
    sync: SyncConfig,
    state: RwLock<SyncState>,
    draining: AtomicBool,
    rerun_requested: AtomicBool,
    metrics: DrainMetrics,
    event_emitter: Option<Arc<dyn SyncEventEmitter>>,
}

struct DrainFlag<'a>(&'a AtomicBool);

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncCoordinator {
    pub fn new(deps: SyncCoordinatorDeps) -> Result<Self, AppError> {
        let SyncCoordinatorDeps {
            store,
            remote,
            config,
            initial_state,
        } = deps;
        config.validate().map_err(AppError::ConfigurationError)?;

        let storage = &config.storage;
        let cache_key = StorageKey::namespaced(&storage.namespace, &storage.cache_key)
            .map_err(AppError::ConfigurationError)?;
        let queue_key = StorageKey::namespaced(&storage.namespace, &storage.queue_key)
            .map_err(AppError::ConfigurationError)?;

        Ok(Self {
            remote,
            cache: AttendanceCache::new(Arc::clone(&store), cache_key),
            queue: PendingWriteQueue::new(store, queue_key),
            sync: config.sync,
            state: RwLock::new(initial_state),
            draining: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
            metrics: DrainMetrics::new(),
            event_emitter: None,
        })
    }

    pub fn with_event_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.event_emitter = Some(emitter);
        self
    }

    pub async fn state(&self) -> SyncState {
        *self.state.read().await
    }

    pub fn metrics(&self) -> DrainMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.len().await
    }

    pub async fn pending_entries(&self) -> Vec<QueueEntry> {
        self.queue.drain_all().await
    }

    pub async fn cache_snapshot(&self) -> Option<CacheSnapshot> {
        self.cache.snapshot().await
    }

    /// 端末に残したキャッシュとキューを消す。未送信の書き込みも破棄される。
    pub async fn clear_local_data(&self) -> Result<(), AppError> {
        self.queue.clear().await?;
        self.cache.invalidate().await;
        info!("local attendance data cleared");
        Ok(())
    }

    /// 出席一覧を返す。
    ///
    /// `Online` のときだけリモートに問い合わせ、成功すればキャッシュを丸ごと置き換える。
    /// 失敗時と `Offline`/`Draining` のときはキャッシュから返す（フィルタはローカルで適用）。
    pub async fn fetch_attendance(
        &self,
        filter: Option<AttendanceFilter>,
    ) -> Vec<SyncedAttendance> {
        let filter = filter.filter(|f| !f.is_empty());

        if self.state().await.allows_network_requests() {
            match self.remote_select(filter.as_ref()).await {
                Ok(records) => {
                    self.cache.save(&records).await;
                    return records;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        transient = e.is_transient(),
                        "attendance fetch failed; serving cache"
                    );
                }
            }
        }

        let cached = self.cache.load().await;
        match filter {
            Some(filter) => cached.into_iter().filter(|a| filter.matches(a)).collect(),
            None => cached,
        }
    }

    /// 1 件の出席を記録する。検証に失敗した場合は I/O を一切行わない。
    pub async fn record_attendance(
        &self,
        draft: AttendanceDraft,
    ) -> Result<RecordOutcome, AppError> {
        let record = AttendanceRecord::try_from(draft)?;

        if !self.state().await.allows_network_requests() {
            self.queue.enqueue(record).await?;
            return Ok(RecordOutcome::Queued);
        }

        // オンライン送信でも冪等キーを付け、キューへ退避したときはそのまま引き継ぐ
        let entry = QueueEntry::new(record);
        let result = self.remote_insert(&entry.record, Some(&entry.entry_id)).await;
        match result {
            Ok(()) => {
                debug!(member_id = %entry.record.member_id, "attendance delivered");
                self.refresh_cache().await;
                Ok(RecordOutcome::Delivered)
            }
            Err(e) if self.should_queue_failed_write(&e) => {
                warn!(error = %e, "online attendance write failed; queueing for retry");
                self.queue.enqueue_entry(entry).await?;
                Ok(RecordOutcome::Queued)
            }
            Err(e) => {
                error!(error = %e, member_id = %entry.record.member_id, "attendance write failed");
                Err(e)
            }
        }
    }

    /// 一括記録。1 件でも不正なら全体を拒否する。
    ///
    /// 同じ (member_id, event_id, attendance_date) が複数あれば最初の位置に最後の内容を残す。
    pub async fn record_attendance_batch(
        &self,
        drafts: Vec<AttendanceDraft>,
    ) -> Result<RecordOutcome, AppError> {
        if drafts.is_empty() {
            return Err(AppError::ValidationError(
                "At least one attendance record is required".to_string(),
            ));
        }

        let mut records: Vec<AttendanceRecord> = Vec::with_capacity(drafts.len());
        let mut positions: HashMap<AttendanceKey, usize> = HashMap::new();
        for draft in drafts {
            let record = AttendanceRecord::try_from(draft)?;
            let key = record.natural_key();
            match positions.get(&key).copied() {
                Some(index) => records[index] = record,
                None => {
                    positions.insert(key, records.len());
                    records.push(record);
                }
            }
        }

        if !self.state().await.allows_network_requests() {
            self.queue.enqueue_all(records).await?;
            return Ok(RecordOutcome::Queued);
        }

        let result = self.remote_upsert(&records).await;
        match result {
            Ok(()) => {
                info!(records = records.len(), "attendance batch delivered");
                self.refresh_cache().await;
                Ok(RecordOutcome::Delivered)
            }
            Err(e) if self.should_queue_failed_write(&e) => {
                warn!(
                    error = %e,
                    records = records.len(),
                    "attendance batch failed; queueing for retry"
                );
                self.queue.enqueue_all(records).await?;
                Ok(RecordOutcome::Queued)
            }
            Err(e) => {
                error!(error = %e, records = records.len(), "attendance batch failed");
                Err(e)
            }
        }
    }

    /// 既存レコードの編集。オフラインでは受け付けない。
    pub async fn update_attendance(
        &self,
        id: &RemoteAttendanceId,
        update: AttendanceUpdate,
    ) -> Result<(), AppError> {
        if update.is_empty() {
            return Err(AppError::ValidationError("No changes to apply".to_string()));
        }
        if !self.state().await.allows_network_requests() {
            return Err(AppError::offline("Updating attendance"));
        }

        self.with_timeout("update", self.remote.update(id, &update)).await?;
        self.refresh_cache().await;
        Ok(())
    }

    pub async fn delete_attendance(&self, id: &RemoteAttendanceId) -> Result<(), AppError> {
        if !self.state().await.allows_network_requests() {
            return Err(AppError::offline("Deleting attendance"));
        }

        self.with_timeout("delete", self.remote.delete(id)).await?;
        self.refresh_cache().await;
        Ok(())
    }

    /// 接続状態の変化を反映し、復帰時にキューが残っていればその場でドレインする。
    pub async fn handle_connectivity_change(&self, connected: bool) -> Option<DrainReport> {
        if self.apply_connectivity(connected).await {
            self.drain().await
        } else {
            None
        }
    }

    /// 状態遷移だけを行い、ドレインが必要かどうかを返す。
    async fn apply_connectivity(&self, connected: bool) -> bool {
        if !connected {
            self.set_state(SyncState::Offline).await;
            return false;
        }

        {
            let mut state = self.state.write().await;
            if *state == SyncState::Offline {
                *state = SyncState::Online;
                drop(state);
                info!("connectivity restored");
                self.emit_state(SyncState::Online);
            }
        }

        !self.queue.is_empty().await
    }

    /// キューを先頭から送信する。
    ///
    /// オフライン時、または別のドレインが実行中なら何もせず None を返す。
    /// 実行中のドレインには再実行を依頼し、そのドレインが終了後にオンラインかつキューが残っていれば
    /// もう一度回す。複数回回した場合は最後のレポートを返す。
    pub async fn drain(&self) -> Option<DrainReport> {
        if !self.begin_drain() {
            debug!("drain already in progress; rerun requested");
            return None;
        }

        let mut last = None;
        loop {
            {
                let _flag = DrainFlag(&self.draining);
                if let Some(report) = self.run_drain().await {
                    last = Some(report);
                }
            }

            if !self.rerun_requested.swap(false, Ordering::SeqCst) {
                break;
            }
            if self.state().await != SyncState::Online || self.queue.is_empty().await {
                break;
            }
            if !self.begin_drain() {
                break;
            }
            debug!("rerunning drain requested during previous run");
        }
        last
    }

    // ガードを取れなかったときは再実行を依頼し、終了間際のドレインと入れ違った場合に備えてもう一度取りに行く
    fn begin_drain(&self) -> bool {
        if self.acquire_drain() {
            self.rerun_requested.store(false, Ordering::SeqCst);
            return true;
        }
        self.rerun_requested.store(true, Ordering::SeqCst);
        if self.acquire_drain() {
            self.rerun_requested.store(false, Ordering::SeqCst);
            return true;
        }
        false
    }

    fn acquire_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    async fn run_drain(&self) -> Option<DrainReport> {
        {
            let mut state = self.state.write().await;
            if *state == SyncState::Offline {
                debug!("skipping drain while offline");
                return None;
            }
            *state = SyncState::Draining;
        }
        self.emit_state(SyncState::Draining);

        let mut report = DrainReport::begin(Utc::now());
        let mut attempted: HashSet<QueueEntryId> = HashSet::new();

        loop {
            let batch: Vec<QueueEntry> = self
                .queue
                .drain_all()
                .await
                .into_iter()
                .filter(|entry| !attempted.contains(&entry.entry_id))
                .collect();
            if batch.is_empty() {
                break;
            }
            if self.state().await == SyncState::Offline {
                report.interrupted = true;
                break;
            }

            report.passes += 1;
            debug!(pass = report.passes, entries = batch.len(), "drain pass started");

            let mut outcomes = Vec::with_capacity(batch.len());
            for entry in &batch {
                if self.state().await == SyncState::Offline {
                    report.interrupted = true;
                    break;
                }

                attempted.insert(entry.entry_id.clone());
                report.attempted += 1;
                match self
                    .remote_insert(&entry.record, Some(&entry.entry_id))
                    .await
                {
                    Ok(()) => outcomes.push(DeliveryOutcome::Delivered(entry.entry_id.clone())),
                    Err(e) => {
                        warn!(
                            entry_id = %entry.entry_id,
                            member_id = %entry.record.member_id,
                            error = %e,
                            "queued attendance delivery failed"
                        );
                        outcomes.push(DeliveryOutcome::Failed {
                            entry_id: entry.entry_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            match self
                .queue
                .settle(&outcomes, self.sync.max_drain_attempts)
                .await
            {
                Ok(summary) => {
                    report.delivered += summary.delivered;
                    report.retained += summary.retained;
                    report.abandoned.extend(summary.abandoned);
                }
                Err(e) => {
                    // 送信済みの項目は次回同じ冪等キーで再送される
                    error!(error = %e, "failed to settle pending queue");
                    for outcome in &outcomes {
                        match outcome {
                            DeliveryOutcome::Delivered(_) => report.delivered += 1,
                            DeliveryOutcome::Failed { .. } => report.retained += 1,
                        }
                    }
                    break;
                }
            }

            if report.interrupted {
                break;
            }
        }

        report.remaining = self.queue.len().await as u32;
        if !report.interrupted {
            self.refresh_cache().await;
        }

        {
            let mut state = self.state.write().await;
            if *state == SyncState::Draining {
                *state = SyncState::Online;
                drop(state);
                self.emit_state(SyncState::Online);
            }
        }

        report.finished_at = Utc::now();
        let snapshot = self.metrics.record(&report);
        match report.failure_summary() {
            Some(summary) => warn!(
                attempted = report.attempted,
                delivered = report.delivered,
                remaining = report.remaining,
                interrupted = report.interrupted,
                consecutive_failure = snapshot.consecutive_failure,
                "{summary}"
            ),
            None => info!(
                attempted = report.attempted,
                delivered = report.delivered,
                passes = report.passes,
                remaining = report.remaining,
                interrupted = report.interrupted,
                "pending attendance drain finished"
            ),
        }
        if let Some(emitter) = &self.event_emitter {
            if let Err(e) = emitter.emit_drain_report(&report) {
                warn!(error = %e, "failed to emit drain report");
            }
        }

        Some(report)
    }

    /// 接続通知を購読するタスクを起動する。返したハンドルを drop すると購読をやめる。
    pub fn spawn_connectivity_listener(
        self: &Arc<Self>,
        observer: Arc<dyn ConnectivityObserver>,
    ) -> ConnectivityListener {
        let mut receiver = observer.subscribe();
        let coordinator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let initial = *receiver.borrow_and_update();
            coordinator.on_connectivity(initial).await;

            while receiver.changed().await.is_ok() {
                let connected = *receiver.borrow_and_update();
                coordinator.on_connectivity(connected).await;
            }
            debug!("connectivity observer closed");
        });

        ConnectivityListener { handle }
    }

    // ドレインは別タスクで回し、その間の切断通知を取りこぼさない
    async fn on_connectivity(self: &Arc<Self>, connected: bool) {
        if self.apply_connectivity(connected).await {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.drain().await;
            });
        }
    }

    async fn refresh_cache(&self) {
        match self.remote_select(None).await {
            Ok(records) => self.cache.save(&records).await,
            Err(e) => warn!(error = %e, "attendance cache refresh failed"),
        }
    }

    async fn set_state(&self, next: SyncState) {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            info!(from = %previous, to = %next, "sync state changed");
            self.emit_state(next);
        }
    }

    fn emit_state(&self, state: SyncState) {
        if let Some(emitter) = &self.event_emitter {
            if let Err(e) = emitter.emit_state_change(state) {
                warn!(error = %e, state = %state, "failed to emit sync state");
            }
        }
    }

    fn should_queue_failed_write(&self, error: &AppError) -> bool {
        self.sync.queue_failed_online_writes && error.is_transient()
    }

    async fn remote_select(
        &self,
        filter: Option<&AttendanceFilter>,
    ) -> Result<Vec<SyncedAttendance>, AppError> {
        self.with_timeout("select", self.remote.select(filter)).await
    }

    async fn remote_insert(
        &self,
        record: &AttendanceRecord,
        idempotency_key: Option<&QueueEntryId>,
    ) -> Result<(), AppError> {
        self.with_timeout("insert", self.remote.insert(record, idempotency_key))
            .await
    }

    async fn remote_upsert(&self, records: &[AttendanceRecord]) -> Result<(), AppError> {
        self.with_timeout("upsert", self.remote.upsert(records)).await
    }

    async fn with_timeout<T, F>(&self, operation: &str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match tokio::time::timeout(self.sync.remote_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "remote {operation} exceeded {}ms",
                self.sync.remote_timeout_ms
            ))),
        }
    }
}

/// 接続通知の購読ハンドル。
pub struct ConnectivityListener {
    handle: JoinHandle<()>,
}

impl ConnectivityListener {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ConnectivityListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
