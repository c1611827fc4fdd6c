//! Error types for the TCP bridge.

use std::io;

/// Errors produced while resolving or reaching a bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid bridge address: {0}")]
    InvalidAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<BridgeError> for io::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(e) => e,
            BridgeError::InvalidAddress(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_io_error() {
        let err: io::Error = BridgeError::InvalidAddress("nowhere".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("nowhere"));

        let err: io::Error = BridgeError::Io(io::Error::other("boom")).into();
        assert_eq!(err.to_string(), "boom");
    }
}
