pub mod connectivity;
pub mod key_value_store;
pub mod remote_attendance;
pub mod sync_events;

pub use connectivity::ConnectivityObserver;
pub use key_value_store::KeyValueStore;
pub use remote_attendance::RemoteAttendanceService;
pub use sync_events::SyncEventEmitter;
