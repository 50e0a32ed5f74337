use crate::application::ports::connectivity::ConnectivityObserver;
use tokio::sync::watch;
use tracing::info;

/// プラットフォーム側の接続通知を `watch` チャネルで配る。
pub struct WatchConnectivity {
    sender: watch::Sender<bool>,
}

impl WatchConnectivity {
    pub fn new(initial: bool) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// 値が変わったときだけ購読者へ通知する。通知したら true。
    pub fn set_connected(&self, connected: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            info!(connected, "connectivity changed");
        }
        changed
    }
}

impl ConnectivityObserver for WatchConnectivity {
    fn is_connected(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
