//! A session is the server's per-conv state: the engine instance that does the reliable transport,
//!  the peer's current address, and the ring buffer into which reassembled chunks are drained
//!  until they contain complete frames.
//!
//! Chunk boundaries (as handed out by the engine) carry no meaning for framing. A frame can be
//!  split across chunks, and a chunk can contain many frames. All framing state lives in the ring
//!  buffer: an incomplete frame stays there (header included) until the rest of it arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Context};
use tracing::{debug, trace};
use crate::buffers::ring_buffer::RingBuffer;
use crate::buffers::scratch_buf::ScratchBuf;
use crate::config::ServerConfig;
use crate::engine::{EngineFactory, EngineOutput, TransportEngine};
use crate::frame_header::FrameHeader;
use crate::handler::{report_warn, SessionEventHandler};
use crate::socket::DatagramSocket;

/// Everything a session borrows from its server for the duration of a single call
pub struct SessionEnv<'a> {
    pub config: &'a ServerConfig,
    pub engine_factory: &'a Arc<dyn EngineFactory>,
    pub socket: &'a Arc<dyn DatagramSocket>,
    pub handler: &'a Arc<dyn SessionEventHandler>,
}

/// The output an engine is created with: datagrams go straight to the server's socket, addressed
///  to the peer address the session had when the engine was created.
struct SessionOutput {
    conv: u32,
    peer_addr: SocketAddr,
    socket: Arc<dyn DatagramSocket>,
    handler: Arc<dyn SessionEventHandler>,
}

impl EngineOutput for SessionOutput {
    fn output(&mut self, datagram: &[u8]) {
        trace!("conv {}: sending {} bytes to {:?}", self.conv, datagram.len(), self.peer_addr);
        if let Err(e) = self.socket.send_to(datagram, self.peer_addr) {
            report_warn(self.handler.as_ref(), &format!("conv {}: error sending {} bytes to {:?} - dropping: {}", self.conv, datagram.len(), self.peer_addr, e));
        }
    }
}

pub struct Session {
    conv: u32,
    peer_addr: SocketAddr,
    engine: Box<dyn TransportEngine>,
    receive_buffer: RingBuffer,
    last_active: u64,
    /// a desynchronized stream is reported once, not on every tick until the session goes away
    desync_reported: bool,
}

impl Session {
    pub fn new(conv: u32, peer_addr: SocketAddr, now: u64, env: &SessionEnv) -> anyhow::Result<Session> {
        let engine = Self::create_engine(conv, peer_addr, env)?;
        debug!("conv {}: new session for {:?}", conv, peer_addr);

        Ok(Session {
            conv,
            peer_addr,
            engine,
            receive_buffer: RingBuffer::new(env.config.receive_buffer_capacity),
            last_active: now,
            desync_reported: false,
        })
    }

    fn create_engine(conv: u32, peer_addr: SocketAddr, env: &SessionEnv) -> anyhow::Result<Box<dyn TransportEngine>> {
        let output = SessionOutput {
            conv,
            peer_addr,
            socket: env.socket.clone(),
            handler: env.handler.clone(),
        };
        env.engine_factory.create(conv, &env.config.engine, Box::new(output))
            .with_context(|| format!("conv {}: creating engine for {:?}", conv, peer_addr))
    }

    pub fn conv(&self) -> u32 {
        self.conv
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn last_active(&self) -> u64 {
        self.last_active
    }

    /// number of bytes in the receive buffer that are not yet part of a delivered frame
    pub fn buffered_len(&self) -> usize {
        self.receive_buffer.used_size()
    }

    /// NB: The session is idle only once the timeout is *exceeded*, i.e. it is still active when
    ///  exactly `idle_timeout` has passed since the last inbound datagram
    pub fn is_idle(&self, now: u64, idle_timeout: Duration) -> bool {
        let timeout_millis = u64::try_from(idle_timeout.as_millis()).unwrap_or(u64::MAX);
        now > self.last_active.saturating_add(timeout_millis)
    }

    /// Handle an inbound datagram (without checksum prefix) that was routed to this session.
    ///
    /// If it arrived from a different address than the session's current peer, the peer migrated
    ///  (e.g. NAT rebinding or a network switch): the session keeps its conv but gets a fresh
    ///  engine bound to the new address, and partially received data is discarded.
    ///
    /// Activity is refreshed even if the engine rejects the datagram.
    pub fn accept_inbound(&mut self, from: SocketAddr, datagram: &[u8], now: u64, env: &SessionEnv) -> anyhow::Result<()> {
        if from != self.peer_addr {
            let engine = Self::create_engine(self.conv, from, env)?;
            report_warn(env.handler.as_ref(), &format!("conv {}: peer address changed from {:?} to {:?} - resetting session", self.conv, self.peer_addr, from));

            self.engine = engine;
            self.peer_addr = from;
            self.receive_buffer.clear();
            self.desync_reported = false;
        }

        trace!("conv {}: received {} bytes from {:?}", self.conv, datagram.len(), from);
        self.last_active = now;
        self.engine.input(datagram)
            .with_context(|| format!("conv {}: engine rejected datagram of {} bytes from {:?}", self.conv, datagram.len(), from))
    }

    /// Queue a message for reliable delivery. The bytes are passed to the engine as-is, so if the
    ///  peer expects framed messages, the application must frame them (see
    ///  [crate::frame_header::encode_frame]).
    pub fn enqueue_send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        self.engine.send(payload)
            .with_context(|| format!("conv {}: engine rejected {} bytes for sending", self.conv, payload.len()))
    }

    /// Drive the session for one tick: give the engine its timer-driven update when due, drain
    ///  reassembled chunks into the receive buffer, and deliver complete frames.
    ///
    /// An `Err` is returned only for internal invariant violations, and means that the session
    ///  must be discarded. Everything else is reported through the handler and the session
    ///  stays usable.
    pub fn tick(&mut self, now: u32, scratch: &mut ScratchBuf, env: &SessionEnv) -> anyhow::Result<()> {
        let due = self.engine.check(now);
        if is_due(now, due) {
            if let Err(e) = self.engine.update(now) {
                report_warn(env.handler.as_ref(), &format!("conv {}: engine update failed: {:#}", self.conv, e));
            }
        }

        self.drain_engine(scratch, env)?;
        self.deliver_frames(scratch, env);
        Ok(())
    }

    fn drain_engine(&mut self, scratch: &mut ScratchBuf, env: &SessionEnv) -> anyhow::Result<()> {
        while let Some(chunk_len) = self.engine.peek_size() {
            if chunk_len > env.config.max_message_size {
                report_warn(env.handler.as_ref(), &format!("conv {}: reassembled chunk of {} bytes exceeds maximum message size of {} - dropping", self.conv, chunk_len, env.config.max_message_size));
                if !self.discard_chunk(chunk_len, scratch, env)? {
                    break;
                }
                continue;
            }

            if chunk_len > self.receive_buffer.free_size() {
                // delivering complete frames makes room
                self.deliver_frames(scratch, env);

                if chunk_len > self.receive_buffer.free_size() {
                    report_warn(env.handler.as_ref(), &format!("conv {}: chunk of {} bytes does not fit into the receive buffer ({} bytes free) - dropping", self.conv, chunk_len, self.receive_buffer.free_size()));
                    if !self.discard_chunk(chunk_len, scratch, env)? {
                        break;
                    }
                    continue;
                }
            }

            scratch.set_len(chunk_len);
            let len = match self.engine.recv(scratch.as_mut()) {
                Ok(len) if len > 0 => len,
                Ok(_) => break,
                Err(e) => {
                    report_warn(env.handler.as_ref(), &format!("conv {}: receiving chunk of {} bytes from engine failed: {:#}", self.conv, chunk_len, e));
                    break;
                }
            };

            let written = self.receive_buffer.write(&scratch.as_ref()[..len]);
            if written != len {
                debug_assert_eq!(written, len, "receive buffer capacity was checked before writing");
                return Err(anyhow!("conv {}: receive buffer accepted only {} of {} bytes", self.conv, written, len));
            }
            trace!("conv {}: drained chunk of {} bytes, receive buffer now has {} bytes", self.conv, len, self.receive_buffer.used_size());
        }
        Ok(())
    }

    /// Remove the next chunk from the engine without keeping it. Returns `Ok(false)` if the engine
    ///  failed to hand out the chunk, in which case draining must stop.
    ///
    /// The scratch buffer is sized for everything the engine can reassemble (see
    ///  [ServerConfig::drain_scratch_len]), so a bigger chunk means the engine broke its contract
    ///  and the session cannot make progress.
    fn discard_chunk(&mut self, chunk_len: usize, scratch: &mut ScratchBuf, env: &SessionEnv) -> anyhow::Result<bool> {
        if chunk_len > scratch.capacity() {
            return Err(anyhow!("conv {}: engine produced a chunk of {} bytes, beyond the drain limit of {}", self.conv, chunk_len, scratch.capacity()));
        }

        scratch.set_len(chunk_len);
        match self.engine.recv(scratch.as_mut()) {
            Ok(_) => Ok(true),
            Err(e) => {
                report_warn(env.handler.as_ref(), &format!("conv {}: discarding chunk of {} bytes failed: {:#}", self.conv, chunk_len, e));
                Ok(false)
            }
        }
    }

    /// Deliver every complete frame in the receive buffer, stopping at the first incomplete one.
    ///  This is idempotent: calling it again without new data delivers nothing.
    fn deliver_frames(&mut self, scratch: &mut ScratchBuf, env: &SessionEnv) {
        let mut prefix = [0u8; FrameHeader::SERIALIZED_LEN];
        while self.receive_buffer.peek(&mut prefix) {
            let len = match FrameHeader::from_prefix(prefix) {
                FrameHeader::Heartbeat => {
                    trace!("conv {}: heartbeat", self.conv);
                    self.receive_buffer.skip(FrameHeader::SERIALIZED_LEN);
                    continue;
                }
                FrameHeader::Message { len } => len as usize,
            };

            if !self.is_valid_frame_len(len, env.config) {
                if !self.desync_reported {
                    report_warn(env.handler.as_ref(), &format!("conv {}: invalid frame length {} - receive stream is desynchronized, no further messages will be delivered", self.conv, len));
                    self.desync_reported = true;
                }
                return;
            }

            if self.receive_buffer.used_size() < FrameHeader::SERIALIZED_LEN + len {
                trace!("conv {}: incomplete frame of {} bytes, {} bytes buffered", self.conv, len, self.receive_buffer.used_size());
                return;
            }

            self.receive_buffer.skip(FrameHeader::SERIALIZED_LEN);
            scratch.set_len(len);
            let read = self.receive_buffer.read(scratch.as_mut());
            debug_assert_eq!(read, len);

            trace!("conv {}: delivering message of {} bytes", self.conv, len);
            env.handler.on_message(self.conv, scratch.as_ref());
        }
    }

    /// A frame must be non-empty, within the configured maximum message size, and fit into the
    ///  receive buffer together with its header. Anything else can never be completed.
    fn is_valid_frame_len(&self, len: usize, config: &ServerConfig) -> bool {
        len > 0
            && len <= config.max_message_size
            && len + FrameHeader::SERIALIZED_LEN <= self.receive_buffer.capacity()
    }
}

/// `now` and `due` are wrapping 32-bit millisecond ticks
fn is_due(now: u32, due: u32) -> bool {
    (now.wrapping_sub(due) as i32) >= 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use bytes::BytesMut;
    use rstest::rstest;
    use crate::frame_header::{encode_frame, encode_heartbeat};
    use crate::handler::MockSessionEventHandler;
    use crate::test_util::memory_socket::MemorySocket;
    use crate::test_util::passthrough_engine::{PassthroughEngine, PassthroughEngineFactory};
    use crate::test_util::recording_handler::RecordingHandler;

    const CONV: u32 = 17;

    struct Fixture {
        config: ServerConfig,
        engine_factory: Arc<PassthroughEngineFactory>,
        socket: Arc<MemorySocket>,
        handler: Arc<RecordingHandler>,
        dyn_engine_factory: Arc<dyn EngineFactory>,
        dyn_socket: Arc<dyn DatagramSocket>,
        dyn_handler: Arc<dyn SessionEventHandler>,
        scratch: ScratchBuf,
    }

    impl Fixture {
        fn new(receive_buffer_capacity: usize, max_message_size: usize) -> Fixture {
            let mut config = ServerConfig::default_ipv4();
            config.receive_buffer_capacity = receive_buffer_capacity;
            config.max_message_size = max_message_size;

            let engine_factory = Arc::new(PassthroughEngineFactory::new());
            let socket = Arc::new(MemorySocket::new());
            let handler = Arc::new(RecordingHandler::new());
            Fixture {
                scratch: ScratchBuf::new(config.drain_scratch_len()),
                dyn_engine_factory: engine_factory.clone(),
                dyn_socket: socket.clone(),
                dyn_handler: handler.clone(),
                config,
                engine_factory,
                socket,
                handler,
            }
        }

        fn env(&self) -> SessionEnv<'_> {
            SessionEnv {
                config: &self.config,
                engine_factory: &self.dyn_engine_factory,
                socket: &self.dyn_socket,
                handler: &self.dyn_handler,
            }
        }

        fn new_session(&self) -> Session {
            Session::new(CONV, peer(1), 0, &self.env()).unwrap()
        }

        /// feed a chunk into the session and tick it, returning the messages delivered by that
        ///  tick
        fn feed(&mut self, session: &mut Session, chunk: &[u8]) -> Vec<Vec<u8>> {
            let before = self.handler.messages().len();
            let datagram = PassthroughEngine::datagram(CONV, chunk);
            session.accept_inbound(session.peer_addr(), &datagram, 0, &self.env()).unwrap();
            self.tick(session);
            self.handler.messages()[before..].iter()
                .map(|(conv, msg)| {
                    assert_eq!(*conv, CONV);
                    msg.clone()
                })
                .collect()
        }

        fn tick(&mut self, session: &mut Session) {
            self.try_tick(session).unwrap();
        }

        fn try_tick(&mut self, session: &mut Session) -> anyhow::Result<()> {
            let env = SessionEnv {
                config: &self.config,
                engine_factory: &self.dyn_engine_factory,
                socket: &self.dyn_socket,
                handler: &self.dyn_handler,
            };
            session.tick(0, &mut self.scratch, &env)
        }
    }

    fn peer(n: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, n], 4000 + n as u16))
    }

    fn framed(messages: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in messages {
            encode_frame(msg, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn test_single_frame() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        assert_eq!(f.feed(&mut session, &framed(&[b"hello"])), vec![b"hello".to_vec()]);
        assert_eq!(session.buffered_len(), 0);
        assert!(f.handler.errors().is_empty());
    }

    #[test]
    fn test_many_frames_in_one_chunk() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        let mut chunk = BytesMut::new();
        encode_heartbeat(&mut chunk);
        encode_frame(b"a", &mut chunk).unwrap();
        encode_frame(b"bc", &mut chunk).unwrap();
        encode_heartbeat(&mut chunk);
        encode_frame(b"def", &mut chunk).unwrap();

        assert_eq!(f.feed(&mut session, &chunk), vec![b"a".to_vec(), b"bc".to_vec(), b"def".to_vec()]);
        assert_eq!(session.buffered_len(), 0);
    }

    #[rstest]
    #[case::inside_header(2)]
    #[case::after_header(4)]
    #[case::inside_payload(6)]
    #[case::before_last_byte(8)]
    fn test_frame_split_across_chunks(#[case] split_at: usize) {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        let chunk = framed(&[b"hello"]);
        assert!(f.feed(&mut session, &chunk[..split_at]).is_empty());
        assert_eq!(session.buffered_len(), split_at);

        assert_eq!(f.feed(&mut session, &chunk[split_at..]), vec![b"hello".to_vec()]);
        assert_eq!(session.buffered_len(), 0);
    }

    #[test]
    fn test_incomplete_frame_survives_ticks() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        let chunk = framed(&[b"x", b"hello"]);
        assert_eq!(f.feed(&mut session, &chunk[..7]), vec![b"x".to_vec()]);

        for _ in 0..3 {
            f.tick(&mut session);
        }
        assert_eq!(f.handler.messages().len(), 1);
        assert_eq!(session.buffered_len(), 2);

        assert_eq!(f.feed(&mut session, &chunk[7..]), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_heartbeat_only() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        assert!(f.feed(&mut session, &[0xff; 8]).is_empty());
        assert_eq!(session.buffered_len(), 0);
        assert!(f.handler.errors().is_empty());
    }

    #[test]
    fn test_frames_wrap_around_ring_end() {
        let mut f = Fixture::new(16, 12);
        let mut session = f.new_session();

        for i in 0..10u8 {
            let msg = [i; 7];
            assert_eq!(f.feed(&mut session, &framed(&[&msg])), vec![msg.to_vec()]);
        }
        assert!(f.handler.errors().is_empty());
    }

    #[rstest]
    #[case::zero_len(&[0, 0, 0, 0, 1])]
    #[case::beyond_max_message_size(&[0, 0, 1, 1, 1])]
    #[case::beyond_ring_capacity(&[0, 0, 0, 253, 1])]
    fn test_desync_reported_once(#[case] chunk: &[u8]) {
        let mut f = Fixture::new(256, 256);
        let mut session = f.new_session();

        assert!(f.feed(&mut session, chunk).is_empty());
        assert!(f.feed(&mut session, &framed(&[b"never delivered"])).is_empty());
        f.tick(&mut session);

        assert_eq!(f.handler.errors().len(), 1);
        assert!(f.handler.errors()[0].contains("desynchronized"));
    }

    #[test]
    fn test_frame_filling_whole_buffer() {
        let mut f = Fixture::new(16, 16);
        let mut session = f.new_session();

        let msg = [9u8; 12];
        assert_eq!(f.feed(&mut session, &framed(&[&msg])), vec![msg.to_vec()]);
        assert!(f.handler.errors().is_empty());
    }

    #[test]
    fn test_oversized_chunk_is_dropped() {
        let mut f = Fixture::new(1024, 8);
        let mut session = f.new_session();

        assert!(f.feed(&mut session, &[1u8; 9]).is_empty());
        assert_eq!(session.buffered_len(), 0);
        assert_eq!(f.handler.errors().len(), 1);
        assert!(f.handler.errors()[0].contains("exceeds maximum message size"));

        // the session keeps working
        assert_eq!(f.feed(&mut session, &framed(&[b"ok"])), vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_oversized_chunk_is_discarded_through_scratch() {
        let mut f = Fixture::new(1024, 8);
        let mut session = f.new_session();
        assert_eq!(f.scratch.capacity(), f.config.drain_scratch_len());

        // bigger than any message, but within what the engine may reassemble
        let chunk = vec![5u8; f.scratch.capacity()];
        assert!(f.feed(&mut session, &chunk).is_empty());
        assert_eq!(f.handler.errors().len(), 1);
        assert_eq!(f.feed(&mut session, &framed(&[b"ok"])), vec![b"ok".to_vec()]);
    }

    #[test]
    fn test_chunk_beyond_drain_limit_fails_tick() {
        let mut f = Fixture::new(1024, 8);
        let mut session = f.new_session();

        let chunk = vec![5u8; f.scratch.capacity() + 1];
        session.accept_inbound(peer(1), &PassthroughEngine::datagram(CONV, &chunk), 0, &f.env()).unwrap();

        let err = f.try_tick(&mut session).unwrap_err();
        assert!(format!("{:#}", err).contains("beyond the drain limit"));
    }

    #[test]
    fn test_chunk_without_room_is_dropped() {
        let mut f = Fixture::new(16, 16);
        let mut session = f.new_session();

        // an incomplete frame occupies 10 bytes, so the next chunk of 8 bytes does not fit
        let chunk = framed(&[&[3u8; 12]]);
        assert!(f.feed(&mut session, &chunk[..10]).is_empty());
        assert!(f.feed(&mut session, &[4u8; 8]).is_empty());

        assert_eq!(session.buffered_len(), 10);
        assert_eq!(f.handler.errors().len(), 1);
        assert!(f.handler.errors()[0].contains("does not fit"));

        assert_eq!(f.feed(&mut session, &chunk[10..]), vec![[3u8; 12].to_vec()]);
    }

    #[test]
    fn test_chunk_fits_after_delivering_frames() {
        let mut f = Fixture::new(16, 16);
        let mut session = f.new_session();

        let first = framed(&[&[1u8; 8]]);
        let second = framed(&[&[2u8; 8]]);

        // two chunks are pending in the engine when the tick starts: the first complete frame
        //  must be delivered before the second chunk fits
        let env = f.env();
        session.accept_inbound(peer(1), &PassthroughEngine::datagram(CONV, &first), 0, &env).unwrap();
        session.accept_inbound(peer(1), &PassthroughEngine::datagram(CONV, &second), 0, &env).unwrap();
        f.tick(&mut session);

        assert_eq!(f.handler.messages(), vec![(CONV, [1u8; 8].to_vec()), (CONV, [2u8; 8].to_vec())]);
        assert!(f.handler.errors().is_empty());
    }

    #[test]
    fn test_migration_resets_session() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();
        assert_eq!(f.engine_factory.num_created.load(Ordering::SeqCst), 1);

        let chunk = framed(&[b"lost"]);
        assert!(f.feed(&mut session, &chunk[..5]).is_empty());
        assert_eq!(session.buffered_len(), 5);

        let datagram = PassthroughEngine::datagram(CONV, &framed(&[b"fresh"]));
        session.accept_inbound(peer(2), &datagram, 10, &f.env()).unwrap();
        assert_eq!(session.peer_addr(), peer(2));
        assert_eq!(session.last_active(), 10);
        assert_eq!(session.buffered_len(), 0);
        assert_eq!(f.engine_factory.num_created.load(Ordering::SeqCst), 2);
        assert_eq!(f.handler.errors().len(), 1);

        f.tick(&mut session);
        assert_eq!(f.handler.messages(), vec![(CONV, b"fresh".to_vec())]);
    }

    #[test]
    fn test_outbound_goes_to_current_peer() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        session.enqueue_send(b"to first").unwrap();
        f.tick(&mut session);

        session.accept_inbound(peer(2), &PassthroughEngine::datagram(CONV, &[]), 0, &f.env()).unwrap();
        session.enqueue_send(b"to second").unwrap();
        f.tick(&mut session);

        assert_eq!(f.socket.take_sent(), vec![
            (peer(1), PassthroughEngine::datagram(CONV, b"to first")),
            (peer(2), PassthroughEngine::datagram(CONV, b"to second")),
        ]);
    }

    #[test]
    fn test_send_error_is_reported() {
        let mut f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        f.socket.fail_sends(true);
        session.enqueue_send(b"doomed").unwrap();
        f.tick(&mut session);

        assert!(f.socket.take_sent().is_empty());
        assert_eq!(f.handler.errors().len(), 1);
        assert!(f.handler.errors()[0].contains("error sending"));
    }

    #[test]
    fn test_engine_rejects_send() {
        let f = Fixture::new(1024, 512);
        let mut session = f.new_session();
        assert!(session.enqueue_send(&vec![0u8; PassthroughEngine::MAX_SEND_LEN + 1]).is_err());
    }

    #[test]
    fn test_activity_refreshed_on_rejected_input() {
        let f = Fixture::new(1024, 512);
        let mut session = f.new_session();

        // conv mismatch inside the engine header
        let datagram = PassthroughEngine::datagram(CONV + 1, b"x");
        assert!(session.accept_inbound(peer(1), &datagram, 99, &f.env()).is_err());
        assert_eq!(session.last_active(), 99);
    }

    #[rstest]
    #[case::fresh(1000, 0, false)]
    #[case::exactly_at_timeout(1000, 1000, false)]
    #[case::beyond_timeout(1000, 1001, true)]
    fn test_is_idle(#[case] last_active: u64, #[case] elapsed: u64, #[case] expected: bool) {
        let f = Fixture::new(1024, 512);
        let mut session = f.new_session();
        session.accept_inbound(peer(1), &PassthroughEngine::datagram(CONV, &[]), last_active, &f.env()).unwrap();

        assert_eq!(session.is_idle(last_active + elapsed, Duration::from_millis(1000)), expected);
    }

    #[rstest]
    #[case::equal(100, 100, true)]
    #[case::later(101, 100, true)]
    #[case::earlier(99, 100, false)]
    #[case::across_wrap(5, u32::MAX - 5, true)]
    #[case::before_wrap(u32::MAX - 5, 5, false)]
    fn test_is_due(#[case] now: u32, #[case] due: u32, #[case] expected: bool) {
        assert_eq!(is_due(now, due), expected);
    }

    #[test]
    fn test_update_only_when_due() {
        let mut handler = MockSessionEventHandler::new();
        handler.expect_on_message().never();
        handler.expect_on_error().never();

        let config = ServerConfig::default_ipv4();
        let engine_factory = Arc::new(PassthroughEngineFactory::new());
        let dyn_engine_factory: Arc<dyn EngineFactory> = engine_factory.clone();
        let dyn_socket: Arc<dyn DatagramSocket> = Arc::new(MemorySocket::new());
        let dyn_handler: Arc<dyn SessionEventHandler> = Arc::new(handler);
        let env = SessionEnv {
            config: &config,
            engine_factory: &dyn_engine_factory,
            socket: &dyn_socket,
            handler: &dyn_handler,
        };

        let mut scratch = ScratchBuf::new(config.max_message_size);
        let mut session = Session::new(CONV, peer(1), 0, &env).unwrap();

        // the passthrough engine is due immediately, and then every `interval_millis`
        let interval = config.engine.interval_millis;
        for now in [0, 1, interval - 1, interval, interval + 1] {
            session.tick(now, &mut scratch, &env).unwrap();
        }
        assert_eq!(engine_factory.num_updates.load(Ordering::SeqCst), 2);
    }
}
