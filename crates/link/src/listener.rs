//! Callback-style consumption of the event stream.
//!
//! Consumers that prefer one method per notification implement
//! [`LinkListener`] and hand it to [`dispatch_events`]; everything else can
//! match on [`LinkEvent`] directly.

use tokio::sync::mpsc;

use crate::types::{ConnectionState, LinkEvent, PeerDescriptor};

/// Receives link notifications. Every method defaults to doing nothing.
pub trait LinkListener: Send {
    fn on_adapter_missing(&mut self) {}

    fn on_adapter_disabled(&mut self) {}

    fn on_disconnected(&mut self) {}

    fn on_connecting(&mut self) {}

    /// A session with the named peer is up.
    fn on_connected(&mut self, _peer_name: &str, _peer_id: &str) {}

    fn on_bytes_read(&mut self, _bytes: &[u8]) {}

    /// Bytes the local side wrote; useful for echoing.
    fn on_bytes_written(&mut self, _bytes: &[u8]) {}

    fn on_reconnecting(&mut self, _peer_id: &str, _attempt: u32, _next_retry_secs: f64) {}
}

/// Maps [`LinkEvent`]s onto a [`LinkListener`].
///
/// `PeerInfo` is held back and folded into the `on_connected` call of the
/// `StateChanged(Connected)` that follows it.
pub struct EventRouter<L> {
    listener: L,
    pending_peer: Option<PeerDescriptor>,
}

impl<L: LinkListener> EventRouter<L> {
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            pending_peer: None,
        }
    }

    pub fn route(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::AdapterUnavailable => self.listener.on_adapter_missing(),
            LinkEvent::AdapterDisabled => self.listener.on_adapter_disabled(),
            LinkEvent::PeerInfo(peer) => self.pending_peer = Some(peer),
            LinkEvent::StateChanged(ConnectionState::Connected) => {
                let peer = self.pending_peer.take().unwrap_or_else(|| PeerDescriptor::new("", ""));
                self.listener.on_connected(&peer.name, &peer.id);
            }
            LinkEvent::StateChanged(ConnectionState::Connecting) => {
                self.listener.on_connecting()
            }
            LinkEvent::StateChanged(ConnectionState::Disconnected) => {
                self.pending_peer = None;
                self.listener.on_disconnected();
            }
            LinkEvent::BytesRead(bytes) => self.listener.on_bytes_read(&bytes),
            LinkEvent::BytesWritten(bytes) => self.listener.on_bytes_written(&bytes),
            LinkEvent::Reconnecting {
                peer_id,
                attempt,
                next_retry_secs,
            } => self
                .listener
                .on_reconnecting(&peer_id, attempt, next_retry_secs),
        }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn into_inner(self) -> L {
        self.listener
    }
}

/// Drains `rx` into `listener` until every sender is gone, then returns
/// the listener.
pub async fn dispatch_events<L: LinkListener>(
    mut rx: mpsc::UnboundedReceiver<LinkEvent>,
    listener: L,
) -> L {
    let mut router = EventRouter::new(listener);
    while let Some(event) = rx.recv().await {
        router.route(event);
    }
    router.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl LinkListener for Recorder {
        fn on_adapter_missing(&mut self) {
            self.calls.push("missing".into());
        }

        fn on_disconnected(&mut self) {
            self.calls.push("disconnected".into());
        }

        fn on_connecting(&mut self) {
            self.calls.push("connecting".into());
        }

        fn on_connected(&mut self, peer_name: &str, peer_id: &str) {
            self.calls.push(format!("connected {peer_name} {peer_id}"));
        }

        fn on_bytes_read(&mut self, bytes: &[u8]) {
            self.calls
                .push(format!("read {}", String::from_utf8_lossy(bytes)));
        }
    }

    #[test]
    fn router_folds_peer_info_into_connected() {
        let mut router = EventRouter::new(Recorder::default());
        router.route(LinkEvent::StateChanged(ConnectionState::Connecting));
        router.route(LinkEvent::PeerInfo(PeerDescriptor::new("AA:BB", "RobotX")));
        router.route(LinkEvent::StateChanged(ConnectionState::Connected));
        router.route(LinkEvent::BytesRead(b"ok".to_vec()));
        // Not overridden by the recorder.
        router.route(LinkEvent::BytesWritten(b"x".to_vec()));

        assert_eq!(
            router.listener().calls,
            ["connecting", "connected RobotX AA:BB", "read ok"]
        );
    }

    #[tokio::test]
    async fn dispatch_runs_until_senders_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(LinkEvent::AdapterUnavailable).unwrap();
        tx.send(LinkEvent::StateChanged(ConnectionState::Disconnected))
            .unwrap();
        drop(tx);

        let recorder = dispatch_events(rx, Recorder::default()).await;
        assert_eq!(recorder.calls, ["missing", "disconnected"]);
    }
}
