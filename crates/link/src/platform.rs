//! Boundary toward the platform's radio stack.
//!
//! The manager never talks to the radio directly. A platform crate
//! implements [`Adapter`] (presence, enablement, known peers) and hands out
//! one [`Transport`] per connection attempt.

use std::io;
use std::sync::Arc;

use crate::types::PeerDescriptor;

/// The local radio adapter.
pub trait Adapter: Send + Sync {
    /// Whether the platform has an adapter at all.
    fn is_present(&self) -> bool;

    /// Whether the adapter is switched on.
    fn is_enabled(&self) -> bool;

    /// Peers already known to the platform (paired/bonded devices).
    fn known_peers(&self) -> Vec<PeerDescriptor>;

    /// Resolves a peer that is not in [`known_peers`](Self::known_peers)
    /// by identifier, e.g. a hardware address typed by the user.
    fn remote_peer(&self, id: &str) -> Option<PeerDescriptor> {
        let _ = id;
        None
    }

    /// Name of the local adapter, used to label our own traffic.
    fn local_name(&self) -> String;

    /// Creates an unconnected transport handle for `peer`.
    ///
    /// Must not block; the handshake happens in [`Transport::connect`].
    fn open(&self, peer: &PeerDescriptor) -> io::Result<Arc<dyn Transport>>;
}

/// One connection attempt, and after a successful handshake the live
/// duplex session.
///
/// All methods take `&self`: the handle is shared between the worker that
/// blocks on it and whoever needs to cancel it. Implementations must make
/// [`close`](Self::close) safe to call from any thread at any time, and a
/// `close` must cause a pending `connect` or `read` to return an error
/// promptly.
pub trait Transport: Send + Sync {
    /// Performs the blocking handshake with the peer.
    fn connect(&self) -> io::Result<()>;

    /// Blocks until bytes are available. `Ok(0)` means the peer closed the
    /// stream.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes the whole payload.
    fn write(&self, data: &[u8]) -> io::Result<()>;

    /// Releases the resource. Idempotent.
    fn close(&self);
}
