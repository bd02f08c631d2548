//! Operator console: line-oriented input read alongside the transport.
//!
//! Lines are either a directive for the driver itself (a line starting with
//! the directive marker that mentions `restart`) or text to forward verbatim
//! to the remote shell. Lines keep their terminator, `\r\n` included, so the
//! remote sees exactly what was typed.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// Directive word that resets the session.
pub const RESTART_DIRECTIVE: &str = "restart";

/// What the operator asked for with one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Reset run count and state.
    Restart,
    /// Send this line to the remote as-is.
    Forward(String),
}

impl ConsoleInput {
    pub fn parse(line: &str, marker: char) -> Self {
        if line.starts_with(marker) && line.contains(RESTART_DIRECTIVE) {
            Self::Restart
        } else {
            Self::Forward(line.to_string())
        }
    }
}

/// Line reader over the operator's input stream.
pub struct Console<R> {
    reader: R,
    /// Bytes of a line still being read. Kept across calls so a cancelled
    /// read loses nothing.
    buf: Vec<u8>,
}

impl Console<BufReader<Stdin>> {
    /// Console reading from the process's stdin.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> Console<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line with its terminator, or `None` at end of input.
    ///
    /// A final line without a newline gets one appended. A line that is not
    /// UTF-8 is consumed and reported as `InvalidData`, so the next call
    /// moves on to the following line.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to the transport.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.reader.read_until(b'\n', &mut self.buf).await?;
        if self.buf.is_empty() {
            return Ok(None);
        }
        if !self.buf.ends_with(b"\n") {
            self.buf.push(b'\n');
        }
        let line = std::mem::take(&mut self.buf);
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
