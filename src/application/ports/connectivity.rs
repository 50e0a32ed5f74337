use tokio::sync::watch;

/// 端末のネットワーク接続状態の通知元。
pub trait ConnectivityObserver: Send + Sync {
    fn is_connected(&self) -> bool;

    /// 受信側を drop すると購読解除になる。
    fn subscribe(&self) -> watch::Receiver<bool>;
}
