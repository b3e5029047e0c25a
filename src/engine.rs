//! The reliable-transport (ARQ) engine is the component that turns raw datagrams into an ordered
//!  stream of chunks: retransmission, windowing, congestion control and reordering all happen
//!  there. This crate treats it as an opaque capability with one instance per session, so any
//!  engine that implements [TransportEngine] can be plugged in through an [EngineFactory].
//!
//! The contract an engine must fulfill:
//!
//! * `input` accepts a raw datagram that starts with the engine header. The header is at
//!    least [ENGINE_HEADER_LEN] bytes and starts with the conv (u32 LE)
//! * `send` accepts application bytes for reliable delivery, or rejects them synchronously
//! * reassembled data is handed out in chunks: `peek_size` returns the size of the next
//!    complete chunk, `recv` removes it
//! * `check` returns the tick at which `update` needs to be called next, and `update` does
//!    the engine's timer-driven bookkeeping (retransmits, ACKs, flushing)
//! * datagrams are emitted through the [EngineOutput] the engine was created with, and only
//!    there. That is how outbound bytes reach the socket
//! * releasing the engine is dropping it

#[cfg(feature = "kcp")]
pub mod kcp;

use crate::config::EngineConfig;

/// The minimum engine header length, which is also the minimum length of a datagram (apart from
///  a checksum prefix). This is the length of a KCP segment header.
pub const ENGINE_HEADER_LEN: usize = 24;

/// Extract the conv from the start of an engine header. The conv is encoded little-endian,
///  following KCP's wire layout.
pub fn conv_from_header(header: &[u8]) -> Option<u32> {
    let raw: [u8; 4] = header.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Where an engine writes the datagrams it emits. An engine is created with an output that is
///  bound to the session's conv and current peer address.
pub trait EngineOutput: Send {
    fn output(&mut self, datagram: &[u8]);
}

pub trait TransportEngine: Send {
    fn conv(&self) -> u32;

    /// feed a raw datagram (starting with the engine header) into the engine
    fn input(&mut self, datagram: &[u8]) -> anyhow::Result<()>;

    /// queue application bytes for reliable delivery. This fails if the engine cannot accept
    ///  them, e.g. because they exceed its queue capacity
    fn send(&mut self, payload: &[u8]) -> anyhow::Result<()>;

    /// size of the next fully reassembled chunk, or `None` if there is none
    fn peek_size(&self) -> Option<usize>;

    /// remove the next fully reassembled chunk, copying it into `buf`. `buf` must be at least
    ///  `peek_size()` bytes long.
    fn recv(&mut self, buf: &mut [u8]) -> anyhow::Result<usize>;

    /// the (32-bit, wrapping) millisecond tick at which `update` should be called next
    fn check(&self, now: u32) -> u32;

    fn update(&mut self, now: u32) -> anyhow::Result<()>;
}

pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self, conv: u32, config: &EngineConfig, output: Box<dyn EngineOutput>) -> anyhow::Result<Box<dyn TransportEngine>>;
}
