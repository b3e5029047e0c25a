//! This crate is a server-side session layer that turns a single UDP socket into many independent,
//!  ordered, reliable message streams. Each stream is identified by a client-supplied 32-bit
//!  connection id (`conv`), and the server keeps one [session::Session] per conv.
//!
//! ## Design goals
//!
//! * One UDP socket for all peers - demultiplexing happens on the conv inside every datagram,
//!    not on the peer's address. A peer may change its address (NAT rebinding, Wifi to GSM) and
//!    keep its conv
//! * Reliability, ordering, retransmission and congestion control are *not* implemented here:
//!    they are delegated to a pluggable ARQ engine (see [engine::TransportEngine]), one instance
//!    per session. KCP is the engine this layer was designed around, and an adapter for the
//!    `kcp` crate is available behind the `kcp` feature
//! * The abstraction offered to the application is *messages*, i.e. length-prefixed chunks of
//!    the byte stream that the engine reassembles
//! * No heap churn in the hot path: every session owns a fixed-capacity ring buffer for stream
//!    reassembly, and the server owns reusable scratch buffers for socket reads and for draining
//!    sessions
//! * Failure isolation: malformed input for one conv never affects other sessions
//! * Single-threaded and externally driven - there is no internal thread, timer or event loop
//!
//! ## Datagram layout
//!
//! ```ascii
//!  0: checksum (4 bytes) - present only if a packet validator is configured
//!  *: engine header (24 bytes minimum) - the first 4 bytes are the conv (u32 LE, KCP layout)
//!  *: engine payload
//! ```
//!
//! Datagrams shorter than checksum + engine header are dropped without creating a session.
//!
//! ## Stream framing
//!
//! Inside the byte stream reassembled by the engine, messages are framed as
//!
//! ```ascii
//!  0: message length L (u32 BE), *not* including these 4 bytes
//!  4: message payload (L bytes)
//! ```
//!
//! The length value `0xFFFF_FFFF` is a heartbeat sentinel: a frame without payload that peers
//!  send to keep a session from idling out. It is consumed silently.
//!
//! ## Tick model
//!
//! All progress happens in [server::Server::tick] (or [server::Server::update], which reads the
//!  wall clock): the socket is drained until it would block, every datagram is routed to its
//!  session, then every session is either evicted for idleness or driven - engine timers,
//!  draining reassembled chunks into the ring buffer, and delivering complete messages to the
//!  [handler::SessionEventHandler].
//!
//! NB: `Server` is not internally synchronized. An application calling `send` or `kick` from
//!      a thread other than the one driving `tick` must serialize those calls itself, e.g. by
//!      owning the server behind a mutex.

pub mod buffers;
pub mod config;
pub mod engine;
pub mod frame_header;
pub mod handler;
pub mod server;
pub mod session;
pub mod socket;
pub mod test_util;
pub mod validation;

#[cfg(test)]
mod tests {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            // .with_max_level(Level::DEBUG)
            .with_max_level(Level::TRACE)
            .try_init()
            .ok();
    }
}
