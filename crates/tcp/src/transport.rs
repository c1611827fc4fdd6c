//! Blocking TCP transport for one connection attempt.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace};

use blueserial_link::Transport;

use crate::error::BridgeError;

#[derive(Default)]
struct Inner {
    stream: Option<Arc<TcpStream>>,
    closed: bool,
}

/// A socket to a bridge, established by [`Transport::connect`].
///
/// Reads and writes go through `&TcpStream` on a shared handle, so a
/// blocked read never holds the lock. `close` shuts the socket down both
/// ways, which wakes that read.
pub struct TcpTransport {
    addr: String,
    connect_timeout: Option<Duration>,
    inner: Mutex<Inner>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, connect_timeout: Option<Duration>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stream(&self) -> io::Result<Arc<TcpStream>> {
        self.lock()
            .stream
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "bridge not connected"))
    }

    fn dial(&self) -> Result<TcpStream, BridgeError> {
        let addrs = resolve(&self.addr)?;
        let Some(timeout) = self.connect_timeout else {
            return Ok(TcpStream::connect(&addrs[..])?);
        };

        let mut last_err = None;
        for addr in &addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(%addr, error = %e, "bridge address unreachable");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .map(BridgeError::Io)
            .unwrap_or_else(|| BridgeError::InvalidAddress(self.addr.clone())))
    }
}

/// Resolves `addr` (`host:port`) to at least one socket address.
pub(crate) fn resolve(addr: &str) -> Result<Vec<SocketAddr>, BridgeError> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|_| BridgeError::InvalidAddress(addr.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(BridgeError::InvalidAddress(addr.to_string()));
    }
    Ok(addrs)
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "transport closed")
}

impl Transport for TcpTransport {
    fn connect(&self) -> io::Result<()> {
        if self.lock().closed {
            return Err(aborted());
        }

        let stream = self.dial()?;
        stream.set_nodelay(true)?;

        // A close() that raced the dial wins.
        let mut inner = self.lock();
        if inner.closed {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(aborted());
        }
        debug!(addr = %self.addr, "bridge connected");
        inner.stream = Some(Arc::new(stream));
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream()?;
        let n = (&*stream).read(buf)?;
        trace!(len = n, "bridge read");
        Ok(n)
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        let mut writer = &*stream;
        writer.write_all(data)?;
        writer.flush()
    }

    fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        if let Some(stream) = inner.stream.take() {
            debug!(addr = %self.addr, "closing bridge socket");
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
