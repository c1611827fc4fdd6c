//! In-memory platform for tests and demos.
//!
//! [`MemoryAdapter`] hands out [`MemoryTransport`]s whose handshake
//! outcome can be scripted per peer. The test side of a transport can feed
//! inbound bytes, inspect what was written, stall writes, release a held
//! handshake, or hang up out-of-band, all from any thread.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::platform::{Adapter, Transport};
use crate::types::PeerDescriptor;

/// How the next handshake to a peer behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Succeeds immediately.
    Accept,
    /// Fails immediately with `ConnectionRefused`.
    Refuse,
    /// Blocks until [`MemoryTransport::resolve_handshake`]; closing the
    /// transport aborts it.
    Hold,
    /// Blocks until [`MemoryTransport::resolve_handshake`] and ignores
    /// `close`, like a radio stack that finishes a handshake it was asked
    /// to cancel.
    HoldUncancellable,
    /// [`Adapter::open`] itself fails.
    OpenFails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Pending,
    Accepted,
    Refused,
}

#[derive(Debug)]
struct TransportState {
    handshake: HandshakeState,
    cancellable: bool,
    connect_attempts: u32,
    connected: bool,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    closed: bool,
    hung_up: bool,
    fail_writes: bool,
    block_writes: bool,
    blocked_writers: usize,
}

/// A transport backed by in-memory queues.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<TransportState>,
    cond: Condvar,
}

impl MemoryTransport {
    /// A transport whose handshake succeeds immediately.
    pub fn new() -> Self {
        Self::with_handshake(Handshake::Accept)
    }

    pub fn with_handshake(handshake: Handshake) -> Self {
        let (state, cancellable) = match handshake {
            Handshake::Accept => (HandshakeState::Accepted, true),
            Handshake::Refuse | Handshake::OpenFails => (HandshakeState::Refused, true),
            Handshake::Hold => (HandshakeState::Pending, true),
            Handshake::HoldUncancellable => (HandshakeState::Pending, false),
        };
        Self {
            state: Mutex::new(TransportState {
                handshake: state,
                cancellable,
                connect_attempts: 0,
                connected: false,
                inbound: VecDeque::new(),
                outbound: Vec::new(),
                closed: false,
                hung_up: false,
                fail_writes: false,
                block_writes: false,
                blocked_writers: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, TransportState>) -> MutexGuard<'a, TransportState> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Finishes a held handshake.
    pub fn resolve_handshake(&self, accept: bool) {
        let mut st = self.lock();
        st.handshake = if accept {
            HandshakeState::Accepted
        } else {
            HandshakeState::Refused
        };
        self.cond.notify_all();
    }

    /// Queues bytes as if the peer had sent them.
    pub fn feed(&self, data: &[u8]) {
        let mut st = self.lock();
        st.inbound.extend(data);
        self.cond.notify_all();
    }

    /// Drops the link from the peer side; pending and future reads fail
    /// once queued bytes are drained.
    pub fn hang_up(&self) {
        let mut st = self.lock();
        st.hung_up = true;
        self.cond.notify_all();
    }

    /// Makes subsequent writes fail without affecting reads.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Makes subsequent writes block until cleared or the transport is
    /// closed, like a peer that stopped draining its receive buffer.
    pub fn set_block_writes(&self, block: bool) {
        let mut st = self.lock();
        st.block_writes = block;
        self.cond.notify_all();
    }

    /// Number of writes currently stuck behind [`Self::set_block_writes`].
    pub fn blocked_writers(&self) -> usize {
        self.lock().blocked_writers
    }

    /// Everything written to the transport so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().outbound.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Number of times `connect` has been entered.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn connect(&self) -> io::Result<()> {
        let mut st = self.lock();
        st.connect_attempts += 1;
        loop {
            if st.closed && st.cancellable {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "transport closed during handshake",
                ));
            }
            match st.handshake {
                HandshakeState::Accepted => {
                    st.connected = true;
                    return Ok(());
                }
                HandshakeState::Refused => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionRefused,
                        "peer refused connection",
                    ));
                }
                HandshakeState::Pending => st = self.wait(st),
            }
        }
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut st = self.lock();
        loop {
            if st.closed {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "transport closed",
                ));
            }
            if !st.connected {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
            }
            if !st.inbound.is_empty() {
                let n = buf.len().min(st.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(st.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if st.hung_up {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "peer hung up",
                ));
            }
            st = self.wait(st);
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        let mut st = self.lock();
        if st.block_writes && !st.closed {
            st.blocked_writers += 1;
            while st.block_writes && !st.closed {
                st = self.wait(st);
            }
            st.blocked_writers -= 1;
        }
        if st.closed || st.hung_up || !st.connected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"));
        }
        if st.fail_writes {
            return Err(io::Error::other("injected write failure"));
        }
        st.outbound.extend_from_slice(data);
        Ok(())
    }

    fn close(&self) {
        let mut st = self.lock();
        st.closed = true;
        self.cond.notify_all();
    }
}

/// An adapter whose peers and handshake outcomes are set up by the test.
#[derive(Debug)]
pub struct MemoryAdapter {
    local_name: String,
    present: AtomicBool,
    enabled: AtomicBool,
    bonded: Mutex<Vec<PeerDescriptor>>,
    remote: Mutex<Vec<PeerDescriptor>>,
    scripts: Mutex<HashMap<String, VecDeque<Handshake>>>,
    opened: Mutex<Vec<(String, Arc<MemoryTransport>)>>,
}

impl MemoryAdapter {
    /// A present, enabled adapter with no known peers.
    pub fn new(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            present: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            bonded: Mutex::new(Vec::new()),
            remote: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Adds a bonded peer, returned by `known_peers`.
    pub fn with_peer(self, peer: PeerDescriptor) -> Self {
        lock(&self.bonded).push(peer);
        self
    }

    /// Adds a peer that is reachable by id but not bonded.
    pub fn with_remote_peer(self, peer: PeerDescriptor) -> Self {
        lock(&self.remote).push(peer);
        self
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Queues the behaviour of the next handshake to `peer_id`. Unscripted
    /// handshakes are accepted.
    pub fn script(&self, peer_id: &str, handshake: Handshake) {
        lock(&self.scripts)
            .entry(peer_id.to_string())
            .or_default()
            .push_back(handshake);
    }

    /// Every transport opened for `peer_id`, oldest first.
    pub fn transports(&self, peer_id: &str) -> Vec<Arc<MemoryTransport>> {
        lock(&self.opened)
            .iter()
            .filter(|(id, _)| id == peer_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// The most recently opened transport for `peer_id`.
    pub fn last_transport(&self, peer_id: &str) -> Option<Arc<MemoryTransport>> {
        self.transports(peer_id).pop()
    }
}

impl Adapter for MemoryAdapter {
    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.is_present() && self.enabled.load(Ordering::SeqCst)
    }

    fn known_peers(&self) -> Vec<PeerDescriptor> {
        lock(&self.bonded).clone()
    }

    fn remote_peer(&self, id: &str) -> Option<PeerDescriptor> {
        lock(&self.remote).iter().find(|p| p.id == id).cloned()
    }

    fn local_name(&self) -> String {
        self.local_name.clone()
    }

    fn open(&self, peer: &PeerDescriptor) -> io::Result<Arc<dyn Transport>> {
        let handshake = lock(&self.scripts)
            .get_mut(&peer.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Handshake::Accept);
        if handshake == Handshake::OpenFails {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no service record for peer",
            ));
        }
        let transport = Arc::new(MemoryTransport::with_handshake(handshake));
        lock(&self.opened).push((peer.id.clone(), transport.clone()));
        Ok(transport)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
