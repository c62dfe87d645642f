//! # Chunked Companion Transport
//!
//! The companion link carries at most [`CHUNK_SIZE`](crate::config::CHUNK_SIZE)
//! bytes per notification and gives no acknowledgment, so:
//!
//! - **Outbound**: a message is cut into MTU-sized [`Chunks`]; the sender paces
//!   them with a fixed delay between notifications.
//! - **Inbound**: writes of any size are accumulated in a [`Reassembler`] and
//!   complete commands are extracted at every `;` terminator.
//!
//! ```text
//! write "BRIGHT:1"  ──►  [BRIGHT:1]
//! write "0;Eff"     ──►  [BRIGHT:10;Eff]  ──next_frame──►  "BRIGHT:10;"
//!                        [Eff]            (stays buffered)
//! ```

use heapless::Vec;
use log::warn;

use crate::config::COMMAND_TERMINATOR;

/// Lazy, in-order sequence of chunks covering a message exactly once
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    inner: core::slice::Chunks<'a, u8>,
}

/// Split `data` into chunks of at most `size` bytes (a zero size is treated as 1)
pub fn chunks(data: &[u8], size: usize) -> Chunks<'_> {
    Chunks {
        inner: data.chunks(size.max(1)),
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Chunks<'_> {}

/// A single write larger than the whole accumulation buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Overflow;

impl embedded_io::Error for Overflow {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::OutOfMemory
    }
}

/// Accumulates companion writes and yields `;`-terminated commands
#[derive(Debug, Default)]
pub struct Reassembler<const N: usize> {
    buf: Vec<u8, N>,
}

impl<const N: usize> Reassembler<N> {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one write
    ///
    /// If the unterminated remainder plus `bytes` would not fit, the remainder
    /// is discarded first. A write larger than the buffer is rejected.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), Overflow> {
        if bytes.len() > N {
            warn!("Companion write of {} bytes exceeds buffer, dropped", bytes.len());
            return Err(Overflow);
        }
        if self.buf.len() + bytes.len() > N {
            warn!("Dropping {} unterminated companion bytes", self.buf.len());
            self.buf.clear();
        }
        self.buf.extend_from_slice(bytes).map_err(|_| Overflow)
    }

    /// Extract the next complete command, terminator included
    pub fn next_frame(&mut self) -> Option<Vec<u8, N>> {
        let end = self.buf.iter().position(|&b| b == COMMAND_TERMINATOR)? + 1;
        let mut frame = Vec::new();
        // `end <= self.buf.len() <= N`
        let _ = frame.extend_from_slice(&self.buf[..end]);

        let remaining = self.buf.len() - end;
        self.buf.rotate_left(end);
        self.buf.truncate(remaining);
        Some(frame)
    }

    /// Bytes still waiting for a terminator
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl<const N: usize> embedded_io::ErrorType for Reassembler<N> {
    type Error = Overflow;
}

impl<const N: usize> embedded_io::Write for Reassembler<N> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.push(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
