//! A fixed-capacity byte ring that a session uses to reassemble the byte stream delivered by its
//!  engine until complete messages are available.
//!
//! Salient points:
//!
//! * capacity is fixed at construction, the backing storage is never reallocated
//! * writes never overwrite unread data: a write that does not fit is cut short, and it is the
//!    caller's job to check the returned count
//! * copies across the wrap-around point are split into (at most) two `copy_from_slice` calls
//! * read and write cursors are equal both when the buffer is empty and when it is full, so
//!    there is an explicit fill state to tell those cases apart
//! * implements `bytes::Buf` for consuming reads, e.g. `get_u32()` across the wrap-around point

use std::cmp::min;
use std::fmt::{Debug, Formatter};
use bytes::Buf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Fill {
    Empty,
    Partial,
    Full,
}

pub struct RingBuffer {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
    fill: Fill,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> RingBuffer {
        assert!(capacity > 0, "ring buffer capacity must be positive");

        RingBuffer {
            buf: vec![0; capacity].into_boxed_slice(),
            read_pos: 0,
            write_pos: 0,
            fill: Fill::Empty,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn used_size(&self) -> usize {
        match self.fill {
            Fill::Empty => 0,
            Fill::Full => self.capacity(),
            Fill::Partial => {
                if self.write_pos > self.read_pos {
                    self.write_pos - self.read_pos
                }
                else {
                    self.capacity() - self.read_pos + self.write_pos
                }
            }
        }
    }

    pub fn free_size(&self) -> usize {
        self.capacity() - self.used_size()
    }

    pub fn is_empty(&self) -> bool {
        self.fill == Fill::Empty
    }

    pub fn is_full(&self) -> bool {
        self.fill == Fill::Full
    }

    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.fill = Fill::Empty;
    }

    /// Append as much of `src` as fits, returning the number of bytes actually written. A short
    ///  write stops exactly at the read cursor, so unread data is never overwritten.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let len = min(src.len(), self.free_size());
        if len == 0 {
            return 0;
        }

        let first = min(len, self.capacity() - self.write_pos);
        self.buf[self.write_pos..self.write_pos + first].copy_from_slice(&src[..first]);
        self.buf[..len - first].copy_from_slice(&src[first..len]);

        self.write_pos = (self.write_pos + len) % self.capacity();
        self.fill = if self.write_pos == self.read_pos { Fill::Full } else { Fill::Partial };
        len
    }

    /// Remove up to `dst.len()` bytes, oldest first, returning the number of bytes copied
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let len = self.copy_out(dst);
        self.skip(len);
        len
    }

    /// Copy exactly `dst.len()` bytes without removing them. Returns `false` and leaves `dst`
    ///  untouched if fewer bytes are buffered.
    pub fn peek(&self, dst: &mut [u8]) -> bool {
        if dst.len() > self.used_size() {
            return false;
        }
        self.copy_out(dst);
        true
    }

    /// Discard up to `len` bytes, returning the number of bytes actually discarded
    pub fn skip(&mut self, len: usize) -> usize {
        let len = min(len, self.used_size());
        if len == 0 {
            return 0;
        }

        self.read_pos = (self.read_pos + len) % self.capacity();
        self.fill = if self.read_pos == self.write_pos { Fill::Empty } else { Fill::Partial };
        len
    }

    fn copy_out(&self, dst: &mut [u8]) -> usize {
        let len = min(dst.len(), self.used_size());

        let first = min(len, self.capacity() - self.read_pos);
        dst[..first].copy_from_slice(&self.buf[self.read_pos..self.read_pos + first]);
        dst[first..len].copy_from_slice(&self.buf[..len - first]);
        len
    }
}

impl Buf for RingBuffer {
    fn remaining(&self) -> usize {
        self.used_size()
    }

    fn chunk(&self) -> &[u8] {
        match self.fill {
            Fill::Empty => &[],
            _ if self.write_pos > self.read_pos => &self.buf[self.read_pos..self.write_pos],
            _ => &self.buf[self.read_pos..],
        }
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.used_size(), "advancing {} bytes past the {} buffered bytes", cnt, self.used_size());
        self.skip(cnt);
    }
}

impl Debug for RingBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("used", &self.used_size())
            .field("read_pos", &self.read_pos)
            .field("write_pos", &self.write_pos)
            .field("fill", &self.fill)
            .finish()
    }
}
