//! Adapter over a fixed set of bridge endpoints.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use blueserial_link::{Adapter, PeerDescriptor, Transport};

use crate::DEFAULT_CONNECT_TIMEOUT;
use crate::error::BridgeError;
use crate::transport::{TcpTransport, resolve};

/// A peer reachable through a bridge at `addr` (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgePeer {
    pub id: String,
    pub name: String,
    pub addr: String,
}

impl BridgePeer {
    pub fn new(id: impl Into<String>, name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            addr: addr.into(),
        }
    }

    /// Checks that the address resolves.
    pub fn validate(&self) -> Result<(), BridgeError> {
        resolve(&self.addr).map(|_| ())
    }

    pub fn descriptor(&self) -> PeerDescriptor {
        PeerDescriptor::new(&self.id, &self.name)
    }
}

/// An [`Adapter`] whose known peers are bridge endpoints.
///
/// Ids that are not configured but parse as a socket address are treated
/// as ad-hoc bridges. Dials are bounded by [`DEFAULT_CONNECT_TIMEOUT`]
/// unless overridden, so a cancelled handshake never waits on the OS
/// connect timeout.
pub struct TcpAdapter {
    local_name: String,
    peers: Vec<BridgePeer>,
    enabled: AtomicBool,
    connect_timeout: Duration,
}

impl TcpAdapter {
    pub fn new(local_name: impl Into<String>, peers: Vec<BridgePeer>) -> Self {
        Self {
            local_name: local_name.into(),
            peers,
            enabled: AtomicBool::new(true),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn peers(&self) -> &[BridgePeer] {
        &self.peers
    }

    fn addr_for(&self, id: &str) -> Option<String> {
        self.peers
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.addr.clone())
            .or_else(|| id.parse::<SocketAddr>().ok().map(|_| id.to_string()))
    }
}

impl Adapter for TcpAdapter {
    fn is_present(&self) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn known_peers(&self) -> Vec<PeerDescriptor> {
        self.peers.iter().map(BridgePeer::descriptor).collect()
    }

    fn remote_peer(&self, id: &str) -> Option<PeerDescriptor> {
        id.parse::<SocketAddr>()
            .ok()
            .map(|_| PeerDescriptor::new(id, id))
    }

    fn local_name(&self) -> String {
        self.local_name.clone()
    }

    fn open(&self, peer: &PeerDescriptor) -> io::Result<Arc<dyn Transport>> {
        let addr = self.addr_for(&peer.id).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no bridge configured for {}", peer.id),
            )
        })?;
        debug!(peer = %peer.id, %addr, "opening bridge transport");
        Ok(Arc::new(TcpTransport::new(addr, Some(self.connect_timeout))))
    }
}
