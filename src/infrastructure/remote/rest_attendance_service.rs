use crate::application::ports::remote_attendance::RemoteAttendanceService;
use crate::domain::entities::{
    AttendanceFilter, AttendanceRecord, AttendanceUpdate, SyncedAttendance,
};
use crate::domain::value_objects::{QueueEntryId, RemoteAttendanceId};
use crate::shared::config::{RemoteConfig, SyncConfig};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REST_PREFIX: &str = "rest/v1";
const SELECT_COLUMNS: &str = "*,members(first_name,last_name),events(title)";
const UPSERT_CONFLICT_COLUMNS: &str = "member_id,event_id,attendance_date";

/// PostgREST 互換 API を話す出席サービスのクライアント。
pub struct RestAttendanceService {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
}

impl RestAttendanceService {
    pub fn new(remote: &RemoteConfig, sync: &SyncConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(sync.remote_timeout())
            .connect_timeout(Duration::from_millis(sync.remote_timeout_ms.min(5_000)))
            .build()
            .map_err(|e| AppError::ConfigurationError(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            table: remote.attendance_table.clone(),
            api_key: remote.api_key.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}/{}", self.base_url, REST_PREFIX, self.table)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let response = self.authorize(builder).send().await?;
        ensure_success(response).await
    }
}

/// select 用のクエリパラメータ。順序は固定。
pub(crate) fn select_query(filter: Option<&AttendanceFilter>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", SELECT_COLUMNS.to_string()),
        ("order", "attendance_date.desc".to_string()),
    ];

    if let Some(filter) = filter {
        if let Some(member_id) = &filter.member_id {
            query.push(("member_id", format!("eq.{member_id}")));
        }
        if let Some(event_id) = &filter.event_id {
            query.push(("event_id", format!("eq.{event_id}")));
        }
        if let Some(from) = filter.date_from {
            query.push(("attendance_date", format!("gte.{from}")));
        }
        if let Some(to) = filter.date_to {
            query.push(("attendance_date", format!("lte.{to}")));
        }
    }

    query
}

fn id_query(id: &RemoteAttendanceId) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

async fn ensure_success(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::Remote {
        status: status.as_u16(),
        message: remote_error_message(&body, status.canonical_reason().unwrap_or("error")),
    })
}

/// PostgREST のエラーボディ `{"message": ...}` から本文を取り出す。
pub(crate) fn remote_error_message(body: &str, fallback: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
        }) if !message.trim().is_empty() => message,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => fallback.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct MemberJoin {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventJoin {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttendanceRow {
    #[serde(default)]
    id: Option<RemoteAttendanceId>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    record: AttendanceRecord,
    #[serde(default)]
    members: Option<MemberJoin>,
    #[serde(default)]
    events: Option<EventJoin>,
}

impl From<AttendanceRow> for SyncedAttendance {
    fn from(row: AttendanceRow) -> Self {
        let member_name = row.members.and_then(|member| {
            let name = [member.first_name, member.last_name]
                .into_iter()
                .flatten()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if name.is_empty() { None } else { Some(name) }
        });

        SyncedAttendance {
            id: row.id,
            created_at: row.created_at,
            record: row.record,
            member_name,
            event_title: row.events.and_then(|event| event.title),
        }
    }
}

#[async_trait]
impl RemoteAttendanceService for RestAttendanceService {
    async fn select(
        &self,
        filter: Option<&AttendanceFilter>,
    ) -> Result<Vec<SyncedAttendance>, AppError> {
        let request = self.client.get(self.table_url()).query(&select_query(filter));
        let rows: Vec<AttendanceRow> = self.send(request).await?.json().await?;
        debug!(rows = rows.len(), "fetched attendance rows");

        Ok(rows.into_iter().map(SyncedAttendance::from).collect())
    }

    async fn insert(
        &self,
        record: &AttendanceRecord,
        idempotency_key: Option<&QueueEntryId>,
    ) -> Result<(), AppError> {
        let mut request = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(record);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key.as_str());
        }

        self.send(request).await?;
        Ok(())
    }

    async fn upsert(&self, records: &[AttendanceRecord]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", UPSERT_CONFLICT_COLUMNS)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(records);

        self.send(request).await?;
        Ok(())
    }

    async fn update(
        &self,
        id: &RemoteAttendanceId,
        update: &AttendanceUpdate,
    ) -> Result<(), AppError> {
        let request = self
            .client
            .patch(self.table_url())
            .query(&id_query(id))
            .header("Prefer", "return=minimal")
            .json(update);

        self.send(request).await?;
        Ok(())
    }

    async fn delete(&self, id: &RemoteAttendanceId) -> Result<(), AppError> {
        let request = self.client.delete(self.table_url()).query(&id_query(id));

        self.send(request).await?;
        Ok(())
    }
}
