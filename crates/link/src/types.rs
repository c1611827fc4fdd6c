//! Public types for the link manager.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Connection state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session and no handshake in progress.
    Disconnected,
    /// Handshake with a peer in progress.
    Connecting,
    /// Session established; bytes flow both ways.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// A peer known to the platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Unique identifier, usually the hardware address.
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

impl PeerDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Events emitted by the connection manager, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The link moved to a new state.
    StateChanged(ConnectionState),
    /// A chunk of bytes arrived from the peer.
    BytesRead(Vec<u8>),
    /// A payload was handed to the transport successfully.
    BytesWritten(Vec<u8>),
    /// Identity of the peer a session was just established with.
    /// Always precedes the matching `StateChanged(Connected)`.
    PeerInfo(PeerDescriptor),
    /// The platform has no radio adapter.
    AdapterUnavailable,
    /// The radio adapter is present but switched off.
    AdapterDisabled,
    /// Opt-in reconnection is about to retry a lost session.
    Reconnecting {
        peer_id: String,
        attempt: u32,
        next_retry_secs: f64,
    },
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Attempts before giving up and staying disconnected.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based),
    /// with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
        let with_jitter = (capped + jitter * offset).max(0.001);
        Duration::from_secs_f64(with_jitter)
    }
}

/// Tuning for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Size of the buffer handed to each blocking read.
    pub read_buffer_size: usize,
    /// Reconnect automatically after an established session is lost.
    /// `None` leaves the link disconnected until the consumer acts.
    pub reconnect: Option<ReconnectConfig>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 1024,
            reconnect: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }

    #[test]
    fn peer_descriptor_serde() {
        let peer = PeerDescriptor::new("AA:BB:CC:DD:EE:FF", "RobotX");
        let json = serde_json::to_string(&peer).unwrap();
        assert_eq!(json, r#"{"id":"AA:BB:CC:DD:EE:FF","name":"RobotX"}"#);
        let back: PeerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, peer);
        assert_eq!(peer.to_string(), "RobotX (AA:BB:CC:DD:EE:FF)");
    }

    #[test]
    fn link_config_defaults() {
        let config = LinkConfig::default();
        assert_eq!(config.read_buffer_size, 1024);
        assert!(config.reconnect.is_none());
    }

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(15));
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn reconnect_config_delay_backoff() {
        let config = ReconnectConfig::default();
        // Base delays: 250ms, 500ms, 1s, 2s, 4s, 8s, 15s (capped), 15s...
        let expected_base = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 15.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let delay = config.delay_for_attempt((i + 1) as u32);
            let secs = delay.as_secs_f64();
            let lo = base * 0.74;
            let hi = base * 1.26;
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn reconnect_jitter_spreads_both_ways() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            ..ReconnectConfig::default()
        };
        let samples: Vec<f64> = (0..2000)
            .map(|_| config.delay_for_attempt(1).as_secs_f64())
            .collect();

        assert!(samples.iter().all(|&s| (0.75..=1.25).contains(&s)));
        assert!(samples.iter().any(|&s| s > 1.1), "jitter never lengthens the delay");
        assert!(samples.iter().any(|&s| s < 0.9), "jitter never shortens the delay");
    }
}
