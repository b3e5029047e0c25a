//! Buffers with fixed capacity that are allocated once and reused, so that the per-datagram and
//!  per-message paths do not allocate.

pub mod ring_buffer;
pub mod scratch_buf;
