pub mod attendance_cache;
pub mod pending_write_queue;
pub mod sync_coordinator;

pub use attendance_cache::AttendanceCache;
pub use pending_write_queue::PendingWriteQueue;
pub use sync_coordinator::{
    ConnectivityListener, RecordOutcome, SyncCoordinator, SyncCoordinatorDeps,
};
