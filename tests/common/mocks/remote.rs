use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use shepherd_lib::application::ports::RemoteAttendanceService;
use shepherd_lib::domain::entities::{
    AttendanceFilter, AttendanceRecord, AttendanceUpdate, SyncedAttendance,
};
use shepherd_lib::domain::value_objects::{QueueEntryId, RemoteAttendanceId};
use shepherd_lib::shared::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Select,
    Insert {
        record: AttendanceRecord,
        idempotency_key: Option<String>,
    },
    Upsert(Vec<AttendanceRecord>),
    Update(String),
    Delete(String),
}

/// 呼び出しを記録するリモートの代役。失敗や遅延を差し込める。
#[derive(Default)]
pub struct RecordingRemote {
    calls: Mutex<Vec<RemoteCall>>,
    rows: Mutex<Vec<SyncedAttendance>>,
    failing_members: Mutex<HashSet<String>>,
    seen_keys: Mutex<HashSet<String>>,
    fail_select: AtomicBool,
    fail_all_writes: AtomicBool,
    insert_delay_ms: AtomicU64,
    select_delay_ms: AtomicU64,
    next_id: AtomicU64,
}

#[allow(dead_code)]
impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inserted_members(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Insert { record, .. } => Some(record.member_id.to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn insert_keys(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Insert {
                    idempotency_key, ..
                } => Some(idempotency_key),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub fn select_count(&self) -> usize {
        self.count(|call| matches!(call, RemoteCall::Select))
    }

    pub fn rows(&self) -> Vec<SyncedAttendance> {
        self.rows.lock().unwrap().clone()
    }

    pub fn fail_member(&self, member_id: &str) {
        self.failing_members
            .lock()
            .unwrap()
            .insert(member_id.to_string());
    }

    pub fn heal_member(&self, member_id: &str) {
        self.failing_members.lock().unwrap().remove(member_id);
    }

    pub fn set_fail_select(&self, fail: bool) {
        self.fail_select.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_all_writes(&self, fail: bool) {
        self.fail_all_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_insert_delay(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_select_delay(&self, delay: Duration) {
        self.select_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_call(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn write_allowed(&self, record: &AttendanceRecord) -> Result<(), AppError> {
        if self.fail_all_writes.load(Ordering::SeqCst)
            || self
                .failing_members
                .lock()
                .unwrap()
                .contains(record.member_id.as_str())
        {
            return Err(AppError::Network(format!(
                "connection reset while sending {}",
                record.member_id
            )));
        }
        Ok(())
    }

    fn store_row(&self, record: &AttendanceRecord) {
        let mut rows = self.rows.lock().unwrap();
        let key = record.natural_key();
        if let Some(row) = rows.iter_mut().find(|row| row.record.natural_key() == key) {
            row.record = record.clone();
            return;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut row = SyncedAttendance::new(record.clone());
        row.id = Some(RemoteAttendanceId::new(id.to_string()).unwrap());
        rows.push(row);
    }
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl RemoteAttendanceService for RecordingRemote {
    async fn select(
        &self,
        filter: Option<&AttendanceFilter>,
    ) -> Result<Vec<SyncedAttendance>, AppError> {
        self.record_call(RemoteCall::Select);
        pause(&self.select_delay_ms).await;
        if self.fail_select.load(Ordering::SeqCst) {
            return Err(AppError::Remote {
                status: 503,
                message: "service unavailable".into(),
            });
        }

        let mut rows: Vec<SyncedAttendance> = self
            .rows()
            .into_iter()
            .filter(|row| filter.map_or(true, |f| f.matches(row)))
            .collect();
        rows.sort_by(|a, b| b.record.attendance_date.cmp(&a.record.attendance_date));
        Ok(rows)
    }

    async fn insert(
        &self,
        record: &AttendanceRecord,
        idempotency_key: Option<&QueueEntryId>,
    ) -> Result<(), AppError> {
        self.record_call(RemoteCall::Insert {
            record: record.clone(),
            idempotency_key: idempotency_key.map(|key| key.to_string()),
        });
        pause(&self.insert_delay_ms).await;
        self.write_allowed(record)?;

        if let Some(key) = idempotency_key {
            if !self.seen_keys.lock().unwrap().insert(key.to_string()) {
                return Ok(());
            }
        }
        self.store_row(record);
        Ok(())
    }

    async fn upsert(&self, records: &[AttendanceRecord]) -> Result<(), AppError> {
        self.record_call(RemoteCall::Upsert(records.to_vec()));
        for record in records {
            self.write_allowed(record)?;
        }
        for record in records {
            self.store_row(record);
        }
        Ok(())
    }

    async fn update(
        &self,
        id: &RemoteAttendanceId,
        update: &AttendanceUpdate,
    ) -> Result<(), AppError> {
        self.record_call(RemoteCall::Update(id.to_string()));
        let mut rows = self.rows.lock().unwrap();
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
        self.record_call(RemoteCall::Delete(id.to_string()));
        self.rows
            .lock()
            .unwrap()
            .retain(|row| row.id.as_ref() != Some(id));
        Ok(())
    }
}
