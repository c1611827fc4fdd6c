//! Serial link manager for a session-oriented radio transport.
//!
//! Owns one logical serial connection to a peer: checks the platform
//! adapter, runs the blocking handshake and read loop on background
//! workers, recovers from link loss, and reports every transition and
//! chunk of data as an ordered [`LinkEvent`] stream.

mod connector;
pub mod error;
pub mod listener;
pub mod manager;
pub mod memory;
pub mod platform;
mod pump;
mod reconnection;
mod session;
pub mod types;

pub use error::LinkError;
pub use listener::{EventRouter, LinkListener, dispatch_events};
pub use manager::ConnectionManager;
pub use platform::{Adapter, Transport};
pub use types::{ConnectionState, LinkConfig, LinkEvent, PeerDescriptor, ReconnectConfig};
