pub mod event_id;
pub mod member_id;
pub mod queue_entry_id;
pub mod remote_attendance_id;
pub mod storage_key;
pub mod sync_state;

pub use event_id::EventId;
pub use member_id::MemberId;
pub use queue_entry_id::QueueEntryId;
pub use remote_attendance_id::RemoteAttendanceId;
pub use storage_key::StorageKey;
pub use sync_state::SyncState;
