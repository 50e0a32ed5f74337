pub mod connectivity;
pub mod database;
pub mod events;
pub mod remote;
pub mod storage;

pub use connectivity::WatchConnectivity;
pub use database::ConnectionPool;
pub use events::TracingSyncEventEmitter;
pub use remote::RestAttendanceService;
pub use storage::{MemoryKeyValueStore, SqliteKeyValueStore};
