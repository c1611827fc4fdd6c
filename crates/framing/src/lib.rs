//! Line framing for text protocols carried over a serial byte stream.
//!
//! The link layer delivers bytes in whatever chunks the radio hands over.
//! Text protocols built on top split that stream on newlines; this crate
//! does the splitting as pure functions so it can be tested without a
//! connection.

pub mod lines;

pub use lines::{LineBuffer, lines_lossy, split_lines};

/// Line terminator appended by [`with_crlf`] (`\r\n`).
pub const CRLF: &[u8] = b"\r\n";

/// Default cap for an unterminated line held by [`LineBuffer`].
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Returns `text` as bytes followed by [`CRLF`].
pub fn with_crlf(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + CRLF.len());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(CRLF);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_crlf_appends_terminator() {
        assert_eq!(with_crlf("g9;"), b"g9;\r\n");
        assert_eq!(with_crlf(""), b"\r\n");
    }
}
