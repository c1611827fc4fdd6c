//! Error types for the link manager.

/// Errors returned by [`ConnectionManager`](crate::ConnectionManager) commands.
///
/// Link failures after a command was accepted (handshake refused, link
/// lost, write failed) are never returned here; they surface as state
/// transitions on the event stream.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no radio adapter present")]
    AdapterUnavailable,

    #[error("radio adapter is disabled")]
    AdapterDisabled,

    #[error("link not set up; call setup() first")]
    NotReady,

    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    #[error("no Tokio runtime available")]
    NoRuntime,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
