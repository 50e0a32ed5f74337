pub mod attendance;
pub mod cache_snapshot;
pub mod drain_report;
pub mod queue_entry;

pub use attendance::{
    AttendanceDraft, AttendanceFilter, AttendanceKey, AttendanceRecord, AttendanceUpdate,
    SyncedAttendance,
};
pub use cache_snapshot::CacheSnapshot;
pub use drain_report::DrainReport;
pub use queue_entry::{AbandonedEntry, DeliveryOutcome, QueueEntry, SettleSummary};
