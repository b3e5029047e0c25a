use std::net::SocketAddr;
use std::time::Duration;
use anyhow::bail;
use crate::engine::ENGINE_HEADER_LEN;
use crate::frame_header::FrameHeader;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address the server's UDP socket is bound to. Port 0 binds to an ephemeral port,
    ///  which can be queried through [crate::server::Server::local_addr] after starting.
    pub bind_addr: SocketAddr,

    /// Sessions without inbound datagrams for longer than this are evicted, notifying the
    ///  handler's `on_idle_kick`. `None` or a zero duration disables eviction altogether.
    pub idle_timeout: Option<Duration>,

    /// This is used for both SO_RCVBUF and SO_SNDBUF. A single socket carries the traffic of all
    ///  sessions, and since it is only drained once per tick, the kernel buffers must be big
    ///  enough to hold a full tick's worth of datagrams.
    pub socket_buffer_size: usize,

    /// Size of the scratch buffer for socket reads. Datagrams bigger than this are truncated by
    ///  the OS and will then fail engine-level parsing.
    pub max_datagram_size: usize,

    /// Capacity of each session's ring buffer, i.e. the maximum number of reassembled bytes that
    ///  can be buffered while waiting for the rest of a message.
    ///
    /// NB: This is allocated once per session, so it is the main factor in per-session memory
    pub receive_buffer_capacity: usize,

    /// Upper bound for both a single chunk drained from the engine and for a framed message's
    ///  length. Longer frames are treated as a corrupted stream.
    pub max_message_size: usize,

    /// Number of bytes preceding the engine header that are handed to the packet validator
    ///  together with the header. This prefix is only present if a validator is configured.
    pub checksum_len: usize,

    pub engine: EngineConfig,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 9527;

    pub fn default_ipv4() -> ServerConfig {
        ServerConfig::for_addr(SocketAddr::from(([0, 0, 0, 0], Self::DEFAULT_PORT)))
    }

    pub fn for_addr(bind_addr: SocketAddr) -> ServerConfig {
        ServerConfig {
            bind_addr,
            idle_timeout: Some(Duration::from_secs(15)),
            socket_buffer_size: 10 * 1024 * 1024,
            max_datagram_size: 64 * 1024,
            receive_buffer_capacity: 64 * 1024,
            max_message_size: 64 * 1024,
            checksum_len: 4,
            engine: EngineConfig::fast_mode(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_datagram_size < ENGINE_HEADER_LEN + self.checksum_len {
            bail!("max datagram size {} is smaller than the minimum datagram of {} bytes", self.max_datagram_size, ENGINE_HEADER_LEN + self.checksum_len);
        }
        if self.receive_buffer_capacity <= FrameHeader::SERIALIZED_LEN {
            bail!("receive buffer capacity {} cannot hold a single non-empty message", self.receive_buffer_capacity);
        }
        if self.max_message_size == 0 {
            bail!("max message size must be positive");
        }
        if self.max_message_size >= FrameHeader::HEARTBEAT_SENTINEL as usize {
            bail!("max message size {} collides with the heartbeat sentinel", self.max_message_size);
        }
        if self.socket_buffer_size == 0 {
            bail!("socket buffer size must be positive");
        }
        self.engine.validate()
    }

    /// The minimum length of a datagram that can possibly be valid, depending on whether there
    ///  is a checksum prefix
    pub fn min_datagram_len(&self, has_validator: bool) -> usize {
        self.checksum_offset(has_validator) + ENGINE_HEADER_LEN
    }

    pub fn checksum_offset(&self, has_validator: bool) -> usize {
        if has_validator {
            self.checksum_len
        }
        else {
            0
        }
    }

    /// Capacity of the scratch buffer that reassembled chunks are drained into. It covers any
    ///  message, any single datagram's payload, and a full receive window of engine segments,
    ///  which bounds what an engine can hand out as one chunk. Chunks beyond the maximum message
    ///  size are discarded through this buffer too.
    pub fn drain_scratch_len(&self) -> usize {
        let max_reassembly = self.engine.receive_window as usize * self.engine.mtu.saturating_sub(ENGINE_HEADER_LEN);
        self.max_message_size
            .max(self.max_datagram_size)
            .max(max_reassembly)
    }

    /// This is the timeout that is actually applied, normalizing 'zero' to 'disabled'
    pub fn effective_idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
            .filter(|t| !t.is_zero())
    }
}

/// Tuning parameters for the per-session ARQ engine. They are applied once when a session's
///  engine is created and never changed afterwards - in particular, an engine re-created after
///  an address migration gets the same parameters.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EngineConfig {
    /// Send segments without waiting for more data to coalesce
    pub no_delay: bool,
    /// Interval of the engine's internal bookkeeping, in milliseconds
    pub interval_millis: u32,
    /// Number of duplicate ACKs that trigger a fast retransmit, 0 disables fast retransmit
    pub fast_resend: u32,
    /// `true` turns the engine's congestion window off
    pub no_congestion_control: bool,
    /// Maximum size of a datagram emitted by the engine, including the engine header
    pub mtu: usize,
    /// Send window in packets
    pub send_window: u16,
    /// Receive window in packets
    pub receive_window: u16,
}

impl EngineConfig {
    /// This is the low-latency profile used for all sessions by default: no delay, 20ms
    ///  interval, fast resend after 2 duplicate ACKs, no congestion control
    pub fn fast_mode() -> EngineConfig {
        EngineConfig {
            no_delay: true,
            interval_millis: 20,
            fast_resend: 2,
            no_congestion_control: true,
            mtu: 128 * 3,
            send_window: 64,
            receive_window: 64,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mtu <= ENGINE_HEADER_LEN {
            bail!("engine MTU {} does not leave room for payload after the {} byte header", self.mtu, ENGINE_HEADER_LEN);
        }
        if self.send_window == 0 || self.receive_window == 0 {
            bail!("engine windows must be positive");
        }
        if self.interval_millis == 0 {
            bail!("engine interval must be positive");
        }
        Ok(())
    }
}
