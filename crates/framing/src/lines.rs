//! Newline splitting with partial-line carry-over.

use tracing::warn;

use crate::DEFAULT_MAX_LINE_LEN;

/// Splits `buf` into complete lines and the unterminated remainder.
///
/// A line ends at `\n`; one `\r` directly before it is stripped, so both
/// LF and CRLF peers are handled. Terminators are not part of the returned
/// lines. Empty lines are kept. The remainder is everything after the last
/// `\n` (possibly empty) and is what a caller should carry into the next
/// call.
pub fn split_lines(buf: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let mut lines = Vec::new();
    let mut start = 0;

    for (i, &b) in buf.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &buf[start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        lines.push(line);
        start = i + 1;
    }

    (lines, &buf[start..])
}

/// Decodes lines as UTF-8, replacing invalid sequences.
pub fn lines_lossy(lines: &[Vec<u8>]) -> Vec<String> {
    lines
        .iter()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .collect()
}

/// Accumulates chunks from the link and yields completed lines.
///
/// The partial line left after each push is kept until its terminator
/// arrives. An unterminated line longer than `max_line_len` is flushed as
/// if it had been terminated, so a peer that never sends a newline cannot
/// grow the buffer without bound.
#[derive(Debug, Clone)]
pub struct LineBuffer {
    partial: Vec<u8>,
    max_line_len: usize,
}

impl LineBuffer {
    /// Creates a buffer with [`DEFAULT_MAX_LINE_LEN`].
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Creates a buffer with a custom cap for unterminated lines.
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_len: max_line_len.max(1),
        }
    }

    /// Appends a chunk and returns every line it completed, oldest first.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.partial.extend_from_slice(chunk);

        let (complete, rest_len) = {
            let (lines, rest) = split_lines(&self.partial);
            let owned: Vec<Vec<u8>> = lines.into_iter().map(<[u8]>::to_vec).collect();
            (owned, rest.len())
        };

        let consumed = self.partial.len() - rest_len;
        self.partial.drain(..consumed);

        let mut out = complete;
        while self.partial.len() > self.max_line_len {
            warn!(
                len = self.partial.len(),
                max = self.max_line_len,
                "unterminated line exceeds limit, flushing"
            );
            let rest = self.partial.split_off(self.max_line_len);
            out.push(std::mem::replace(&mut self.partial, rest));
        }
        out
    }

    /// Bytes received since the last complete line.
    pub fn partial(&self) -> &[u8] {
        &self.partial
    }

    /// Takes the pending partial line, leaving the buffer empty.
    pub fn take_partial(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.partial)
    }

    /// Drops any pending partial line. Call this when the link goes down so
    /// a fragment from one session does not prefix the next.
    pub fn reset(&mut self) {
        self.partial.clear();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}
