//! Connection manager: the link state machine.
//!
//! Owns the current state, at most one Connector and at most one Session
//! Pump, and the sending side of the event channel. Every transition runs
//! under one mutex and emits its events before releasing it, so the event
//! stream is ordered exactly like the transitions that produced it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use blueserial_framing::CRLF;

use crate::error::LinkError;
use crate::platform::{Adapter, Transport};
use crate::reconnection::{cancel_reconnect, reconnect_loop};
use crate::session::Session;
use crate::types::{ConnectionState, LinkConfig, LinkEvent, PeerDescriptor};
use crate::{connector, pump};

/// The active handshake attempt.
struct ConnectorSlot {
    id: u64,
    transport: Arc<dyn Transport>,
    peer: PeerDescriptor,
}

/// The active read loop.
struct PumpSlot {
    id: u64,
    session: Arc<Session>,
}

/// Everything guarded by the manager mutex.
struct LinkState {
    state: ConnectionState,
    ready: bool,
    known_peers: Vec<PeerDescriptor>,
    connector: Option<ConnectorSlot>,
    pump: Option<PumpSlot>,
    /// Peer of the live session; `None` unless connected.
    peer: Option<PeerDescriptor>,
    reconnect: Option<CancellationToken>,
    worker_seq: u64,
}

impl LinkState {
    /// Drops the cached adapter check so commands report `NotReady`.
    fn forget_adapter(&mut self) {
        self.ready = false;
        self.known_peers.clear();
    }

    fn next_worker_id(&mut self) -> u64 {
        self.worker_seq = self.worker_seq.wrapping_add(1);
        self.worker_seq
    }

    /// Detaches whatever workers are live. A pending handshake is cancelled
    /// right away; the session is handed back so the caller can close it
    /// with [`retire`] once the lock is released. The workers notice on
    /// their own and exit without touching state.
    #[must_use]
    fn reset_workers(&mut self) -> Option<Arc<Session>> {
        if let Some(c) = self.connector.take() {
            debug!(peer = %c.peer.id, worker = c.id, "cancelling handshake");
            c.transport.close();
        }
        self.peer = None;
        self.pump.take().map(|p| {
            debug!(worker = p.id, "closing session");
            p.session
        })
    }
}

/// Closes a detached session. Waits out an in-flight write, so it must
/// run without the manager lock.
fn retire(session: Option<Arc<Session>>) {
    if let Some(session) = session {
        session.close();
    }
}

/// State shared between the manager handle and its workers.
pub(crate) struct Shared {
    adapter: Arc<dyn Adapter>,
    pub(crate) config: LinkConfig,
    runtime: Handle,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    state_tx: watch::Sender<ConnectionState>,
    link: Mutex<LinkState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LinkEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events_tx.send(event);
    }

    fn set_state(&self, link: &mut LinkState, state: ConnectionState) {
        debug!(from = %link.state, to = %state, "link state changed");
        link.state = state;
        self.state_tx.send_replace(state);
        self.emit(LinkEvent::StateChanged(state));
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Tears down the current worker and starts a Connector for `peer`.
    /// Returns the detached session for [`retire`].
    #[must_use]
    fn launch_connector(
        self: &Arc<Self>,
        link: &mut LinkState,
        peer: PeerDescriptor,
    ) -> Option<Arc<Session>> {
        let retired = link.reset_workers();

        let transport = match self.adapter.open(&peer) {
            Ok(t) => t,
            Err(e) => {
                warn!(peer = %peer.id, error = %e, "failed to open transport");
                self.set_state(link, ConnectionState::Connecting);
                self.set_state(link, ConnectionState::Disconnected);
                return retired;
            }
        };

        let id = link.next_worker_id();
        info!(peer = %peer.id, name = %peer.name, worker = id, "connecting");
        link.connector = Some(ConnectorSlot {
            id,
            transport: transport.clone(),
            peer: peer.clone(),
        });
        self.set_state(link, ConnectionState::Connecting);

        let shared = self.clone();
        self.runtime
            .spawn_blocking(move || connector::run(shared, id, transport, peer));
        retired
    }

    pub(crate) fn is_active_connector(&self, id: u64) -> bool {
        self.lock().connector.as_ref().is_some_and(|c| c.id == id)
    }

    pub(crate) fn on_connect_succeeded(
        self: &Arc<Self>,
        id: u64,
        transport: Arc<dyn Transport>,
        peer: PeerDescriptor,
    ) {
        let mut link = self.lock();
        if !link.connector.as_ref().is_some_and(|c| c.id == id) {
            debug!(peer = %peer.id, worker = id, "discarding superseded handshake");
            transport.close();
            return;
        }
        link.connector = None;
        let stray = link.pump.take().map(|p| p.session);

        let session = Arc::new(Session::new(transport));
        let pump_id = link.next_worker_id();
        link.pump = Some(PumpSlot {
            id: pump_id,
            session: session.clone(),
        });
        link.peer = Some(peer.clone());

        info!(peer = %peer.id, name = %peer.name, "connected");
        self.emit(LinkEvent::PeerInfo(peer));
        self.set_state(&mut link, ConnectionState::Connected);

        let shared = self.clone();
        self.runtime
            .spawn_blocking(move || pump::run(shared, pump_id, session));
        drop(link);
        retire(stray);
    }

    pub(crate) fn on_connect_failed(&self, id: u64) {
        let mut link = self.lock();
        if !link.connector.as_ref().is_some_and(|c| c.id == id) {
            return;
        }
        let retired = link.reset_workers();
        self.set_state(&mut link, ConnectionState::Disconnected);
        drop(link);
        retire(retired);
    }

    pub(crate) fn on_link_lost(self: &Arc<Self>, id: u64) {
        let mut link = self.lock();
        if !link.pump.as_ref().is_some_and(|p| p.id == id) {
            return;
        }
        let peer = link.peer.clone();
        let retired = link.reset_workers();
        info!(peer = ?peer.as_ref().map(|p| &p.id), "link lost");
        self.set_state(&mut link, ConnectionState::Disconnected);

        if let Some(config) = self.config.reconnect.clone()
            && let Some(peer) = peer
        {
            cancel_reconnect(&mut link.reconnect);
            let cancel = CancellationToken::new();
            link.reconnect = Some(cancel.clone());
            self.runtime
                .spawn(reconnect_loop(self.clone(), peer, config, cancel));
        }
        drop(link);
        retire(retired);
    }

    /// Emits a chunk read by pump `id`. Returns `false` once that pump has
    /// been superseded; the chunk is then dropped.
    pub(crate) fn deliver_read(&self, id: u64, bytes: Vec<u8>) -> bool {
        let link = self.lock();
        if !link.pump.as_ref().is_some_and(|p| p.id == id) {
            return false;
        }
        self.emit(LinkEvent::BytesRead(bytes));
        true
    }

    /// Emits `Reconnecting` unless the loop was cancelled meanwhile.
    pub(crate) fn announce_reconnect(
        &self,
        cancel: &CancellationToken,
        peer: &PeerDescriptor,
        attempt: u32,
        next_retry_secs: f64,
    ) -> bool {
        let _link = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        self.emit(LinkEvent::Reconnecting {
            peer_id: peer.id.clone(),
            attempt,
            next_retry_secs,
        });
        true
    }

    /// Starts a reconnect attempt unless the loop was cancelled meanwhile.
    pub(crate) fn relaunch(self: &Arc<Self>, cancel: &CancellationToken, peer: &PeerDescriptor) -> bool {
        let mut link = self.lock();
        if cancel.is_cancelled() {
            return false;
        }
        let retired = self.launch_connector(&mut link, peer.clone());
        drop(link);
        retire(retired);
        true
    }

    fn teardown(&self, emit: bool) {
        let mut link = self.lock();
        cancel_reconnect(&mut link.reconnect);
        let retired = link.reset_workers();
        if emit || link.state != ConnectionState::Disconnected {
            self.set_state(&mut link, ConnectionState::Disconnected);
        }
        drop(link);
        retire(retired);
    }
}

/// Manages one serial link to a peer over a platform [`Adapter`].
///
/// Commands return immediately; progress is reported on the event stream
/// from [`take_events`](Self::take_events). Must be created inside a Tokio
/// runtime, whose blocking pool runs the handshake and read workers.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<LinkEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager in the Disconnected state.
    pub fn new(adapter: Arc<dyn Adapter>, config: LinkConfig) -> Result<Self, LinkError> {
        let runtime = Handle::try_current().map_err(|_| LinkError::NoRuntime)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Arc::new(Shared {
            adapter,
            config,
            runtime,
            events_tx,
            state_tx,
            link: Mutex::new(LinkState {
                state: ConnectionState::Disconnected,
                ready: false,
                known_peers: Vec::new(),
                connector: None,
                pump: None,
                peer: None,
                reconnect: None,
                worker_seq: 0,
            }),
        });

        Ok(Self {
            shared,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Watches state transitions without consuming the event stream.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe_state()
    }

    /// Checks the adapter and caches the known peers.
    ///
    /// A missing or disabled adapter is reported both as an event and as
    /// the returned error; call again once the condition is resolved.
    pub fn setup(&self) -> Result<(), LinkError> {
        let adapter = &self.shared.adapter;
        let mut link = self.shared.lock();

        if !adapter.is_present() {
            warn!("no radio adapter present");
            link.forget_adapter();
            self.shared.emit(LinkEvent::AdapterUnavailable);
            return Err(LinkError::AdapterUnavailable);
        }
        if !adapter.is_enabled() {
            warn!("radio adapter is disabled");
            link.forget_adapter();
            self.shared.emit(LinkEvent::AdapterDisabled);
            return Err(LinkError::AdapterDisabled);
        }

        link.known_peers = adapter.known_peers();
        link.ready = true;
        info!(peers = link.known_peers.len(), "link ready");
        Ok(())
    }

    /// Whether the adapter is present and switched on.
    pub fn is_enabled(&self) -> bool {
        self.shared.adapter.is_enabled()
    }

    /// Resets to an idle Disconnected state, stopping any worker.
    pub fn start(&self) -> Result<(), LinkError> {
        let mut link = self.shared.lock();
        if !link.ready {
            return Err(LinkError::NotReady);
        }
        cancel_reconnect(&mut link.reconnect);
        let retired = link.reset_workers();
        self.shared
            .set_state(&mut link, ConnectionState::Disconnected);
        drop(link);
        retire(retired);
        Ok(())
    }

    /// Connects to `peer`, superseding any attempt or session in progress.
    pub fn connect(&self, peer: &PeerDescriptor) -> Result<(), LinkError> {
        let mut link = self.shared.lock();
        if !link.ready {
            return Err(LinkError::NotReady);
        }
        cancel_reconnect(&mut link.reconnect);
        let retired = self.shared.launch_connector(&mut link, peer.clone());
        drop(link);
        retire(retired);
        Ok(())
    }

    /// Connects to a peer by identifier: a known peer first, otherwise one
    /// the adapter can resolve.
    pub fn connect_by_id(&self, id: &str) -> Result<(), LinkError> {
        let known = {
            let link = self.shared.lock();
            if !link.ready {
                return Err(LinkError::NotReady);
            }
            link.known_peers.iter().find(|p| p.id == id).cloned()
        };
        let peer = known
            .or_else(|| self.shared.adapter.remote_peer(id))
            .ok_or_else(|| LinkError::UnknownPeer(id.to_string()))?;
        self.connect(&peer)
    }

    /// Sends bytes to the peer. Dropped silently unless connected.
    ///
    /// A failed write is logged and leaves the session up; only the
    /// missing `BytesWritten` event tells the consumer about it.
    pub fn write(&self, data: &[u8]) {
        let (id, session) = {
            let link = self.shared.lock();
            if link.state != ConnectionState::Connected {
                return;
            }
            match &link.pump {
                Some(p) => (p.id, p.session.clone()),
                None => return,
            }
        };

        if let Err(e) = session.write(data) {
            warn!(error = %e, len = data.len(), "write failed");
            return;
        }

        let link = self.shared.lock();
        if link.pump.as_ref().is_some_and(|p| p.id == id) {
            self.shared.emit(LinkEvent::BytesWritten(data.to_vec()));
        }
    }

    /// Sends `text` followed by CRLF, as two writes.
    pub fn write_line(&self, text: &str) {
        self.write(text.as_bytes());
        self.write(CRLF);
    }

    /// Stops any worker and goes to Disconnected. Emits one
    /// `StateChanged(Disconnected)` per call.
    pub fn stop(&self) {
        info!("stopping link");
        self.shared.teardown(true);
    }

    /// Stops everything and forgets the adapter check. Emits
    /// `StateChanged(Disconnected)` only if the link was not already idle.
    pub fn shutdown(&self) {
        self.shared.teardown(false);
        self.shared.lock().forget_adapter();
    }

    pub fn current_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.current_state() == ConnectionState::Connected
    }

    /// Peer of the live session, if connected.
    pub fn connected_peer(&self) -> Option<PeerDescriptor> {
        self.shared.lock().peer.clone()
    }

    pub fn connected_peer_name(&self) -> Option<String> {
        self.shared.lock().peer.as_ref().map(|p| p.name.clone())
    }

    /// Peers cached by the last successful [`setup`](Self::setup).
    pub fn known_peers(&self) -> Vec<PeerDescriptor> {
        self.shared.lock().known_peers.clone()
    }

    /// Name of the local adapter.
    pub fn local_name(&self) -> String {
        self.shared.adapter.local_name()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.teardown(false);
    }
}
