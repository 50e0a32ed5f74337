pub mod remote;
pub mod slow_store;

pub use remote::{RecordingRemote, RemoteCall};
pub use slow_store::SlowStore;
