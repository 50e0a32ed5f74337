use crate::domain::value_objects::{EventId, MemberId, RemoteAttendanceId};
use crate::shared::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const ATTENDANCE_DATE_FORMAT: &str = "%Y-%m-%d";

/// 画面から受け取る未検証の出席入力。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceDraft {
    pub member_id: String,
    pub event_id: String,
    pub attendance_date: String,
    pub present: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AttendanceDraft {
    pub fn new(
        member_id: impl Into<String>,
        event_id: impl Into<String>,
        attendance_date: impl Into<String>,
        present: bool,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            event_id: event_id.into(),
            attendance_date: attendance_date.into(),
            present,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// 必須項目の欠落だけを確認する。I/O の前に呼ばれる。
    pub fn validate(&self) -> Result<(), String> {
        if self.member_id.trim().is_empty() {
            return Err("Member ID is required".to_string());
        }
        if self.event_id.trim().is_empty() {
            return Err("Event ID is required".to_string());
        }
        if self.attendance_date.trim().is_empty() {
            return Err("Attendance date is required".to_string());
        }
        Ok(())
    }
}

/// 1 人のメンバーの、あるイベント・ある日付での出欠。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub member_id: MemberId,
    pub event_id: EventId,
    pub attendance_date: NaiveDate,
    pub present: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// リモート側で一意制約になっている (member_id, event_id, attendance_date)。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttendanceKey {
    pub member_id: MemberId,
    pub event_id: EventId,
    pub attendance_date: NaiveDate,
}

impl AttendanceRecord {
    pub fn new(
        member_id: MemberId,
        event_id: EventId,
        attendance_date: NaiveDate,
        present: bool,
        notes: Option<String>,
    ) -> Self {
        Self {
            member_id,
            event_id,
            attendance_date,
            present,
            notes: normalize_notes(notes),
        }
    }

    pub fn natural_key(&self) -> AttendanceKey {
        AttendanceKey {
            member_id: self.member_id.clone(),
            event_id: self.event_id.clone(),
            attendance_date: self.attendance_date,
        }
    }
}

impl TryFrom<AttendanceDraft> for AttendanceRecord {
    type Error = AppError;

    fn try_from(draft: AttendanceDraft) -> Result<Self, Self::Error> {
        draft.validate().map_err(AppError::ValidationError)?;

        let member_id = MemberId::new(draft.member_id).map_err(AppError::ValidationError)?;
        let event_id = EventId::new(draft.event_id).map_err(AppError::ValidationError)?;
        let attendance_date =
            NaiveDate::parse_from_str(draft.attendance_date.trim(), ATTENDANCE_DATE_FORMAT)
                .map_err(|_| {
                    AppError::ValidationError(format!(
                        "Attendance date must be YYYY-MM-DD: {}",
                        draft.attendance_date
                    ))
                })?;

        Ok(Self::new(
            member_id,
            event_id,
            attendance_date,
            draft.present,
            draft.notes,
        ))
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

/// リモートから取得した出席レコード（サーバー採番項目と表示用の結合データ付き）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedAttendance {
    #[serde(default)]
    pub id: Option<RemoteAttendanceId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub record: AttendanceRecord,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub event_title: Option<String>,
}

impl SyncedAttendance {
    pub fn new(record: AttendanceRecord) -> Self {
        Self {
            id: None,
            created_at: None,
            record,
            member_name: None,
            event_title: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceFilter {
    pub member_id: Option<MemberId>,
    pub event_id: Option<EventId>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl AttendanceFilter {
    pub fn for_event(event_id: EventId) -> Self {
        Self {
            event_id: Some(event_id),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.member_id.is_none()
            && self.event_id.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    pub fn matches(&self, attendance: &SyncedAttendance) -> bool {
        let record = &attendance.record;
        if let Some(member_id) = &self.member_id {
            if &record.member_id != member_id {
                return false;
            }
        }
        if let Some(event_id) = &self.event_id {
            if &record.event_id != event_id {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if record.attendance_date < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if record.attendance_date > to {
                return false;
            }
        }
        true
    }
}

/// 既存レコードの編集内容。None の項目は変更しない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AttendanceUpdate {
    pub fn is_empty(&self) -> bool {
        self.present.is_none() && self.notes.is_none()
    }
}
