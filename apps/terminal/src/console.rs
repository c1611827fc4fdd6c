//! Console input commands and output rendering.

use std::io::Write;

use chrono::{DateTime, Local};

use blueserial_framing::{LineBuffer, lines_lossy};
use blueserial_link::LinkListener;

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(String),
    Disconnect,
    Peers,
    Quit,
    /// Anything that is not a command is sent to the peer.
    Send(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Ok(Self::Send(line.trim_end_matches(['\r', '\n']).to_string()));
        };

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("connect"), Some(id)) => Ok(Self::Connect(id.to_string())),
            (Some("connect"), None) => Err("usage: /connect <peer id>".into()),
            (Some("disconnect"), _) => Ok(Self::Disconnect),
            (Some("peers"), _) => Ok(Self::Peers),
            (Some("quit" | "exit"), _) => Ok(Self::Quit),
            (Some(other), _) => Err(format!("unknown command: /{other}")),
            (None, _) => Err("empty command".into()),
        }
    }
}

/// Formats one transcript line.
pub fn format_entry(at: &DateTime<Local>, who: &str, text: &str) -> String {
    format!("[{}] {who}: {text}", at.format("%H:%M:%S"))
}

/// Renders link events as a timestamped transcript.
///
/// Inbound and echoed bytes are reassembled into lines separately, so a
/// `write_line` that arrives as text plus terminator prints once.
pub struct Printer<W> {
    out: W,
    local_name: String,
    peer_name: String,
    inbound: LineBuffer,
    outbound: LineBuffer,
}

impl<W: Write + Send> Printer<W> {
    pub fn new(out: W, local_name: impl Into<String>) -> Self {
        Self {
            out,
            local_name: local_name.into(),
            peer_name: String::from("peer"),
            inbound: LineBuffer::new(),
            outbound: LineBuffer::new(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn status(&mut self, text: &str) {
        let _ = writeln!(self.out, "-- {text}");
        let _ = self.out.flush();
    }

    fn lines(&mut self, who: &str, lines: Vec<Vec<u8>>) {
        let now = Local::now();
        for line in lines_lossy(&lines) {
            let _ = writeln!(self.out, "{}", format_entry(&now, who, &line));
        }
        let _ = self.out.flush();
    }

    fn flush_partials(&mut self) {
        let inbound = self.inbound.take_partial();
        if !inbound.is_empty() {
            let who = self.peer_name.clone();
            self.lines(&who, vec![inbound]);
        }
        self.outbound.reset();
    }
}

impl<W: Write + Send> LinkListener for Printer<W> {
    fn on_adapter_missing(&mut self) {
        self.status("no radio adapter present");
    }

    fn on_adapter_disabled(&mut self) {
        self.status("radio adapter is disabled");
    }

    fn on_disconnected(&mut self) {
        self.flush_partials();
        self.status("disconnected");
    }

    fn on_connecting(&mut self) {
        self.status("connecting...");
    }

    fn on_connected(&mut self, peer_name: &str, peer_id: &str) {
        self.peer_name = peer_name.to_string();
        self.inbound.reset();
        self.outbound.reset();
        self.status(&format!("connected to {peer_name} ({peer_id})"));
    }

    fn on_bytes_read(&mut self, bytes: &[u8]) {
        let lines = self.inbound.push(bytes);
        let who = self.peer_name.clone();
        self.lines(&who, lines);
    }

    fn on_bytes_written(&mut self, bytes: &[u8]) {
        let lines = self.outbound.push(bytes);
        let who = self.local_name.clone();
        self.lines(&who, lines);
    }

    fn on_reconnecting(&mut self, peer_id: &str, attempt: u32, next_retry_secs: f64) {
        self.status(&format!(
            "link to {peer_id} lost, retry {attempt} in {next_retry_secs:.1}s"
        ));
    }
}
