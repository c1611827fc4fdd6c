//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Serial terminal over a radio bridge.
#[derive(Parser, Debug, Clone)]
#[command(name = "blueserial-term")]
#[command(about = "Line-oriented serial terminal over a blueserial link")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the per-user config directory).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Peer id or bridge address to connect to on startup.
    #[arg(long)]
    pub peer: Option<String>,

    /// List configured peers and exit.
    #[arg(long)]
    pub list: bool,

    /// Reconnect automatically when the link drops.
    #[arg(long)]
    pub reconnect: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info,blueserial=debug")]
    pub log_level: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["blueserial-term"]);
        assert!(cli.config.is_none());
        assert!(cli.peer.is_none());
        assert!(!cli.list);
        assert!(!cli.reconnect);
        assert_eq!(cli.log_level, "info,blueserial=debug");
    }

    #[test]
    fn peer_and_flags() {
        let cli = Cli::parse_from([
            "blueserial-term",
            "--peer",
            "AA:BB:CC:DD:EE:FF",
            "--reconnect",
            "--config",
            "/tmp/term.json",
        ]);
        assert_eq!(cli.peer.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert!(cli.reconnect);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/term.json")));
    }
}
