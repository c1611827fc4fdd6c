//! Connector worker: runs the blocking handshake for one attempt.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::manager::Shared;
use crate::platform::Transport;
use crate::types::PeerDescriptor;

/// Blocks on the handshake, then reports the outcome to the manager.
///
/// Runs on the blocking pool. A superseded attempt is unblocked by the
/// manager closing `transport`; whatever it reports afterwards is ignored
/// because `id` is no longer the active connector.
pub(crate) fn run(shared: Arc<Shared>, id: u64, transport: Arc<dyn Transport>, peer: PeerDescriptor) {
    debug!(peer = %peer.id, worker = id, "handshake started");

    match transport.connect() {
        Ok(()) => shared.on_connect_succeeded(id, transport, peer),
        Err(e) => {
            if shared.is_active_connector(id) {
                warn!(peer = %peer.id, error = %e, "handshake failed");
            } else {
                debug!(peer = %peer.id, worker = id, error = %e, "superseded handshake ended");
            }
            transport.close();
            shared.on_connect_failed(id);
        }
    }
}
