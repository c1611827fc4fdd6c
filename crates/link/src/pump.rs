//! Session pump: blocking read loop for an established session.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::manager::Shared;
use crate::session::Session;

/// Reads from the session until it fails, then reports link loss.
///
/// Only reads count as a liveness signal; write failures never end the
/// loop. Closing the session from the manager unblocks the pending read,
/// after which the loop exits without mutating anything.
pub(crate) fn run(shared: Arc<Shared>, id: u64, session: Arc<Session>) {
    let mut buf = vec![0u8; shared.config.read_buffer_size.max(1)];

    loop {
        match session.read(&mut buf) {
            Ok(0) => {
                debug!(worker = id, "peer closed the stream");
                break;
            }
            Ok(n) => {
                trace!(worker = id, len = n, "read from session");
                if !shared.deliver_read(id, buf[..n].to_vec()) {
                    debug!(worker = id, "pump superseded, exiting");
                    return;
                }
            }
            Err(e) => {
                if session.is_closed() {
                    debug!(worker = id, "session closed, pump exiting");
                } else {
                    warn!(worker = id, error = %e, "read failed");
                }
                break;
            }
        }
    }

    shared.on_link_lost(id);
}
