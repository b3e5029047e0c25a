//! Pre-allocated scratch space for the server's hot path: one buffer receives datagrams from the
//!  socket, another is the landing zone for chunks drained from a session's engine and for
//!  messages read out of a session's ring buffer.
//!
//! Scratch buffers are owned by a [crate::server::Server] instance and lent to sessions for the
//!  duration of a single call, so several servers (e.g. on different threads) never share them.

use std::fmt::{Debug, Formatter};

pub struct ScratchBuf {
    buf: Vec<u8>,
    len: usize,
}
impl ScratchBuf {
    /// create a new ScratchBuf with the given capacity, filled with zeroes
    pub fn new(capacity: usize) -> ScratchBuf {
        ScratchBuf {
            // initialized eagerly since it is allocated once and reused for the server's lifetime
            buf: vec![0; capacity],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// make the entire underlying buffer available through as_mut(), e.g. as a target for a
    ///  socket read
    pub fn maximize_len(&mut self) {
        self.len = self.capacity();
    }

    /// make the first `len` bytes available, e.g. as the target for reading a message of
    ///  known length
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity(), "length {} exceeds scratch buffer capacity {}", len, self.capacity());
        self.len = len;
    }

    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Debug for ScratchBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScratchBuf[{}/{}]", self.len, self.capacity())
    }
}

impl AsRef<[u8]> for ScratchBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}
impl AsMut<[u8]> for ScratchBuf {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }
}
