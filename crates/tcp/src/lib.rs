//! Serial link adapter for radio bridges reachable over TCP.
//!
//! Many setups expose an RFCOMM channel as a TCP socket (ser2net, serial
//! gateways, emulators). [`TcpAdapter`] plugs such bridges into the link
//! manager: each configured [`BridgePeer`] maps a peer id to a bridge
//! address, and every connection attempt gets its own [`TcpTransport`].

pub mod adapter;
pub mod error;
pub mod transport;

pub use adapter::{BridgePeer, TcpAdapter};
pub use error::BridgeError;
pub use transport::TcpTransport;

use std::time::Duration;

/// Connect timeout used when none is configured explicitly.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
