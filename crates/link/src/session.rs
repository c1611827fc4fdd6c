//! Live session wrapper shared by the read pump and writers.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::trace;

use crate::platform::Transport;

/// An established transport plus the lock that serializes writers.
///
/// Reads do not take the lock: the pump is the only reader and closing
/// must be able to interrupt it. Closing shuts the transport down before
/// taking the lock, so a write stuck on a peer that stopped draining fails
/// instead of holding the close up.
pub(crate) struct Session {
    transport: Arc<dyn Transport>,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.transport.read(buf)
    }

    /// Writes the payload; fails once the session is closed.
    pub(crate) fn write(&self, data: &[u8]) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "session closed"));
        }
        self.transport.write(data)?;
        trace!(len = data.len(), "wrote to session");
        Ok(())
    }

    /// Closes the transport, then waits for a write that was already in
    /// flight to return. Never call this with the manager lock held.
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.transport.close();
        }
        drop(self.write_lock.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
