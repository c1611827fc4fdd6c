//! Opt-in reconnection after an established session is lost.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::Shared;
use crate::types::{ConnectionState, PeerDescriptor, ReconnectConfig};

/// Cancels the reconnect loop stored in `slot`, if any.
pub(crate) fn cancel_reconnect(slot: &mut Option<CancellationToken>) {
    if let Some(token) = slot.take() {
        token.cancel();
    }
}

/// Retries `peer` with exponential backoff until a session is up, the
/// attempts run out, or `cancel` fires.
///
/// Each attempt goes through the regular connect path, so a consumer
/// watching the event stream sees `Reconnecting` followed by the usual
/// Connecting/Connected or Connecting/Disconnected sequence.
pub(crate) async fn reconnect_loop(
    shared: Arc<Shared>,
    peer: PeerDescriptor,
    config: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut state_rx = shared.subscribe_state();

    for attempt in 1..=config.max_attempts {
        let delay = config.delay_for_attempt(attempt);
        let delay_secs = delay.as_secs_f64();

        if !shared.announce_reconnect(&cancel, &peer, attempt, delay_secs) {
            debug!(peer = %peer.id, "reconnect cancelled");
            return;
        }
        info!(
            peer = %peer.id,
            attempt,
            delay_secs = format_args!("{delay_secs:.2}"),
            "reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(peer = %peer.id, "reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if !shared.relaunch(&cancel, &peer) {
            debug!(peer = %peer.id, "reconnect cancelled");
            return;
        }

        let outcome = loop {
            let current = *state_rx.borrow_and_update();
            if current != ConnectionState::Connecting {
                break current;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        };

        if outcome == ConnectionState::Connected {
            info!(peer = %peer.id, attempt, "reconnected");
            return;
        }
        debug!(peer = %peer.id, attempt, "reconnect attempt failed");
    }

    warn!(
        peer = %peer.id,
        attempts = config.max_attempts,
        "giving up on reconnection"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionManager;
    use crate::manager::tests::{
        ROBOT_ID, assert_quiet, assert_quiet_for, next_event, other, ready_manager, robot,
    };
    use crate::memory::{Handshake, MemoryAdapter};
    use crate::types::{LinkConfig, LinkEvent};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fast_reconnect(max_attempts: u32) -> LinkConfig {
        LinkConfig {
            reconnect: Some(ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                backoff_factor: 2.0,
                max_attempts,
            }),
            ..LinkConfig::default()
        }
    }

    /// Backoff long enough to act during the sleep; the quiet window
    /// below outlasts it.
    fn slow_reconnect() -> LinkConfig {
        LinkConfig {
            reconnect: Some(ReconnectConfig {
                initial_delay: Duration::from_millis(200),
                max_delay: Duration::from_millis(200),
                backoff_factor: 2.0,
                max_attempts: 3,
            }),
            ..LinkConfig::default()
        }
    }

    const PAST_BACKOFF: Duration = Duration::from_millis(600);

    /// Connects to the robot, drops the link and waits for the first
    /// `Reconnecting`.
    async fn lose_link(
        adapter: &Arc<MemoryAdapter>,
        config: LinkConfig,
    ) -> (ConnectionManager, mpsc::UnboundedReceiver<LinkEvent>) {
        let (manager, mut rx) = ready_manager(adapter, config);
        manager.connect(&robot()).unwrap();
        for _ in 0..3 {
            next_event(&mut rx).await;
        }
        adapter.last_transport(ROBOT_ID).unwrap().hang_up();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        assert!(matches!(
            next_event(&mut rx).await,
            LinkEvent::Reconnecting { attempt: 1, .. }
        ));
        (manager, rx)
    }

    fn state(s: ConnectionState) -> LinkEvent {
        LinkEvent::StateChanged(s)
    }

    #[test]
    fn cancel_reconnect_clears_slot() {
        let token = CancellationToken::new();
        let mut slot = Some(token.clone());
        cancel_reconnect(&mut slot);
        assert!(slot.is_none());
        assert!(token.is_cancelled());
        cancel_reconnect(&mut slot);
    }

    #[tokio::test]
    async fn lost_session_is_reestablished() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        let (manager, mut rx) = ready_manager(&adapter, fast_reconnect(3));

        manager.connect(&robot()).unwrap();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
        assert_eq!(next_event(&mut rx).await, LinkEvent::PeerInfo(robot()));
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connected));

        adapter.last_transport(ROBOT_ID).unwrap().hang_up();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        match next_event(&mut rx).await {
            LinkEvent::Reconnecting { peer_id, attempt, .. } => {
                assert_eq!(peer_id, ROBOT_ID);
                assert_eq!(attempt, 1);
            }
            other => panic!("expected Reconnecting, got {other:?}"),
        }
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
        assert_eq!(next_event(&mut rx).await, LinkEvent::PeerInfo(robot()));
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connected));
        assert_quiet(&mut rx).await;

        assert_eq!(adapter.transports(ROBOT_ID).len(), 2);
        assert!(manager.is_connected());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        adapter.script(ROBOT_ID, Handshake::Accept);
        for _ in 0..2 {
            adapter.script(ROBOT_ID, Handshake::Refuse);
        }
        let (manager, mut rx) = ready_manager(&adapter, fast_reconnect(2));

        manager.connect(&robot()).unwrap();
        for _ in 0..3 {
            next_event(&mut rx).await;
        }
        adapter.last_transport(ROBOT_ID).unwrap().hang_up();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));

        for expected in 1..=2 {
            assert!(matches!(
                next_event(&mut rx).await,
                LinkEvent::Reconnecting { attempt, .. } if attempt == expected
            ));
            assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
            assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        }
        assert_quiet(&mut rx).await;
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
        assert_eq!(adapter.transports(ROBOT_ID).len(), 3);
    }

    #[tokio::test]
    async fn stop_cancels_pending_retry() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        let (manager, mut rx) = lose_link(&adapter, slow_reconnect()).await;

        manager.stop();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        assert_quiet_for(&mut rx, PAST_BACKOFF).await;
        assert_eq!(adapter.transports(ROBOT_ID).len(), 1);
    }

    #[tokio::test]
    async fn connect_cancels_pending_retry() {
        let adapter = Arc::new(
            MemoryAdapter::new("phone")
                .with_peer(robot())
                .with_peer(other()),
        );
        let (manager, mut rx) = lose_link(&adapter, slow_reconnect()).await;

        manager.connect(&other()).unwrap();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
        assert_eq!(next_event(&mut rx).await, LinkEvent::PeerInfo(other()));
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connected));
        assert_quiet_for(&mut rx, PAST_BACKOFF).await;

        assert_eq!(adapter.transports(ROBOT_ID).len(), 1);
        assert_eq!(manager.connected_peer(), Some(other()));
    }

    #[tokio::test]
    async fn start_cancels_pending_retry() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        let (manager, mut rx) = lose_link(&adapter, slow_reconnect()).await;

        manager.start().unwrap();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        assert_quiet_for(&mut rx, PAST_BACKOFF).await;
        assert_eq!(adapter.transports(ROBOT_ID).len(), 1);
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_retry() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        let (manager, mut rx) = lose_link(&adapter, slow_reconnect()).await;

        manager.shutdown();
        assert_quiet_for(&mut rx, PAST_BACKOFF).await;
        assert_eq!(adapter.transports(ROBOT_ID).len(), 1);
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn handshake_failure_does_not_reconnect() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        adapter.script(ROBOT_ID, Handshake::Refuse);
        let (manager, mut rx) = ready_manager(&adapter, fast_reconnect(3));

        manager.connect(&robot()).unwrap();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Connecting));
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        assert_quiet(&mut rx).await;
        assert_eq!(adapter.transports(ROBOT_ID).len(), 1);
    }

    #[tokio::test]
    async fn explicit_stop_does_not_reconnect() {
        let adapter = Arc::new(MemoryAdapter::new("phone").with_peer(robot()));
        let (manager, mut rx) = ready_manager(&adapter, fast_reconnect(3));

        manager.connect(&robot()).unwrap();
        for _ in 0..3 {
            next_event(&mut rx).await;
        }
        manager.stop();
        assert_eq!(next_event(&mut rx).await, state(ConnectionState::Disconnected));
        assert_quiet(&mut rx).await;
    }
}
