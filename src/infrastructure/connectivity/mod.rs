pub mod watch_connectivity;

pub use watch_connectivity::WatchConnectivity;
