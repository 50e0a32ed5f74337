use serde::{Deserialize, Serialize};
use std::fmt;

/// 同期コーディネーターの接続状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Online,
    Offline,
    /// 再接続直後、キューを送信している間だけの一時状態。
    Draining,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Online => "online",
            SyncState::Offline => "offline",
            SyncState::Draining => "draining",
        }
    }

    /// リモートへの読み取り・即時書き込みが許可されるのは `Online` のときだけ。
    pub fn allows_network_requests(&self) -> bool {
        matches!(self, SyncState::Online)
    }

    pub fn from_connected(is_connected: bool) -> Self {
        if is_connected {
            SyncState::Online
        } else {
            SyncState::Offline
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
