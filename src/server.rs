use std::collections::hash_map::Entry;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::{anyhow, bail};
use bytes::BytesMut;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};
use crate::buffers::scratch_buf::ScratchBuf;
use crate::config::ServerConfig;
use crate::engine::{conv_from_header, EngineFactory};
use crate::frame_header::encode_frame;
use crate::handler::{report_error, report_warn, SessionEventHandler};
use crate::session::{Session, SessionEnv};
use crate::socket::{bind_udp_socket, DatagramSocket};
use crate::validation::PacketValidator;

/// Milliseconds since the epoch, which is the clock [Server::update] ticks with
pub fn clock_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// The server owns the UDP socket and the conv -> session map. It does nothing on its own:
///  the application drives it by calling [Server::tick] (or [Server::update]) periodically,
///  typically at the engine's bookkeeping interval.
///
/// Sessions are created implicitly by the first valid datagram carrying a previously unknown
///  conv, and they go away when they are idle for longer than the configured timeout or when
///  the application kicks them.
pub struct Server {
    config: ServerConfig,
    engine_factory: Arc<dyn EngineFactory>,
    handler: Arc<dyn SessionEventHandler>,
    validator: Option<Arc<dyn PacketValidator>>,
    socket: Option<Arc<dyn DatagramSocket>>,
    sessions: FxHashMap<u32, Session>,
    /// the `now` of the most recent tick, in milliseconds
    current_clock: u64,
    datagram_buf: ScratchBuf,
    message_buf: ScratchBuf,
}

impl Server {
    pub fn new(config: ServerConfig, engine_factory: Arc<dyn EngineFactory>, handler: Arc<dyn SessionEventHandler>) -> Server {
        Server {
            datagram_buf: ScratchBuf::new(config.max_datagram_size),
            message_buf: ScratchBuf::new(config.drain_scratch_len()),
            config,
            engine_factory,
            handler,
            validator: None,
            socket: None,
            sessions: Default::default(),
            current_clock: 0,
        }
    }

    /// Bind the UDP socket. If anything goes wrong, the failure is reported and the server is
    ///  left in its initial (not started) state.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.is_started() {
            bail!("server is already started");
        }

        match self.config.validate().and_then(|_| bind_udp_socket(&self.config)) {
            Ok(socket) => {
                self.socket = Some(Arc::new(socket));
                Ok(())
            }
            Err(e) => {
                report_error(self.handler.as_ref(), &format!("starting server on {:?} failed: {:#}", self.config.bind_addr, e));
                self.stop();
                Err(e)
            }
        }
    }

    /// Start with a socket that was created elsewhere, e.g. an in-memory socket for testing
    pub fn start_with_socket(&mut self, socket: Arc<dyn DatagramSocket>) -> anyhow::Result<()> {
        if self.is_started() {
            bail!("server is already started");
        }
        if let Err(e) = self.config.validate() {
            report_error(self.handler.as_ref(), &format!("starting server failed: {:#}", e));
            return Err(e);
        }

        info!("starting server on {:?}", socket.local_addr());
        self.socket = Some(socket);
        Ok(())
    }

    /// Release all sessions and the socket. The server can be started again afterwards.
    pub fn stop(&mut self) {
        if self.is_started() || !self.sessions.is_empty() {
            info!("stopping server with {} sessions", self.sessions.len());
        }
        self.sessions.clear();
        self.socket = None;
    }

    pub fn is_started(&self) -> bool {
        self.socket.is_some()
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        match &self.socket {
            Some(socket) => Ok(socket.local_addr()?),
            None => bail!("server is not started"),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The new configuration applies to sessions created afterwards. Existing sessions keep their
    ///  receive buffers and engines.
    pub fn set_config(&mut self, config: ServerConfig) -> anyhow::Result<()> {
        config.validate()?;

        if config.max_datagram_size != self.datagram_buf.capacity() {
            self.datagram_buf = ScratchBuf::new(config.max_datagram_size);
        }
        // existing sessions keep engines and frames sized for the previous config
        let message_buf_capacity = config.drain_scratch_len().max(self.config.drain_scratch_len());
        if message_buf_capacity != self.message_buf.capacity() {
            self.message_buf = ScratchBuf::new(message_buf_capacity);
        }

        debug!("new server config: {:?}", config);
        self.config = config;
        Ok(())
    }

    /// NB: Engines of existing sessions report send errors to the handler that was registered
    ///  when they were created
    pub fn set_handler(&mut self, handler: Arc<dyn SessionEventHandler>) {
        self.handler = handler;
    }

    /// A validator requires every datagram to carry a checksum prefix of
    ///  [ServerConfig::checksum_len] bytes in front of the engine header
    pub fn set_validator(&mut self, validator: Option<Arc<dyn PacketValidator>>) {
        self.validator = validator;
    }

    pub fn session_exists(&self, conv: u32) -> bool {
        self.sessions.contains_key(&conv)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_peer_addr(&self, conv: u32) -> Option<SocketAddr> {
        self.sessions.get(&conv)
            .map(|s| s.peer_addr())
    }

    pub fn current_clock(&self) -> u64 {
        self.current_clock
    }

    /// Remove a session immediately. This does *not* call the handler's `on_idle_kick`.
    pub fn kick(&mut self, conv: u32) -> bool {
        let existed = self.sessions.remove(&conv).is_some();
        if existed {
            debug!("conv {}: kicked", conv);
        }
        existed
    }

    /// Pass raw bytes to a session's engine for reliable delivery. They go on the wire with the
    ///  engine's next update.
    pub fn send(&mut self, conv: u32, payload: &[u8]) -> anyhow::Result<()> {
        let result = match self.sessions.get_mut(&conv) {
            Some(session) => session.enqueue_send(payload),
            None => Err(anyhow!("conv {}: no session - dropping {} bytes", conv, payload.len())),
        };
        if let Err(e) = &result {
            report_warn(self.handler.as_ref(), &format!("{:#}", e));
        }
        result
    }

    /// Frame a message (length prefix) and send it
    pub fn send_framed(&mut self, conv: u32, message: &[u8]) -> anyhow::Result<()> {
        let mut buf = BytesMut::new();
        encode_frame(message, &mut buf)?;
        self.send(conv, &buf)
    }

    /// [Server::tick] with the wall clock
    pub fn update(&mut self) {
        self.tick(clock_ms());
    }

    /// Drain the socket, routing every datagram to its session, and then drive all sessions.
    ///  `now` is in milliseconds and is expected to be monotonic.
    pub fn tick(&mut self, now: u64) {
        self.current_clock = now;

        let Some(socket) = self.socket.clone() else {
            debug!("tick on a server that is not started - ignoring");
            return;
        };

        self.drain_socket(&socket);
        self.update_sessions(&socket);
    }

    fn drain_socket(&mut self, socket: &Arc<dyn DatagramSocket>) {
        loop {
            self.datagram_buf.maximize_len();
            let (len, from) = match socket.try_recv_from(self.datagram_buf.as_mut()) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    report_error(self.handler.as_ref(), &format!("error receiving from socket: {}", e));
                    break;
                }
            };
            self.datagram_buf.truncate(len);
            self.on_datagram(from, socket);
        }
    }

    fn on_datagram(&mut self, from: SocketAddr, socket: &Arc<dyn DatagramSocket>) {
        let has_validator = self.validator.is_some();
        let checksum_offset = self.config.checksum_offset(has_validator);
        let min_len = self.config.min_datagram_len(has_validator);

        let datagram = self.datagram_buf.as_ref();
        trace!("received {} bytes from {:?}", datagram.len(), from);

        let conv = match conv_from_header(datagram.get(checksum_offset..).unwrap_or_default()) {
            Some(conv) if datagram.len() >= min_len => conv,
            _ => {
                report_warn(self.handler.as_ref(), &format!("datagram of {} bytes from {:?} is shorter than the minimum of {} - dropping", datagram.len(), from, min_len));
                return;
            }
        };

        if let Some(validator) = &self.validator {
            if let Err(e) = validator.validate(conv, &datagram[..min_len]) {
                report_warn(self.handler.as_ref(), &format!("datagram from {:?} failed validation - dropping: {:#}", from, e));
                return;
            }
        }

        let now = self.current_clock;
        let env = SessionEnv {
            config: &self.config,
            engine_factory: &self.engine_factory,
            socket,
            handler: &self.handler,
        };

        let session = match self.sessions.entry(conv) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => match Session::new(conv, from, now, &env) {
                Ok(session) => e.insert(session),
                Err(err) => {
                    report_error(self.handler.as_ref(), &format!("{:#} - dropping datagram", err));
                    return;
                }
            },
        };

        if let Err(e) = session.accept_inbound(from, &datagram[checksum_offset..], now, &env) {
            report_warn(self.handler.as_ref(), &format!("{:#}", e));
        }
    }

    fn update_sessions(&mut self, socket: &Arc<dyn DatagramSocket>) {
        let now = self.current_clock;
        // engine ticks are 32 bit and wrap around
        let now32 = (now & 0xffff_ffff) as u32;
        let idle_timeout = self.config.effective_idle_timeout();

        let env = SessionEnv {
            config: &self.config,
            engine_factory: &self.engine_factory,
            socket,
            handler: &self.handler,
        };
        let message_buf = &mut self.message_buf;

        self.sessions.retain(|&conv, session| {
            if let Some(idle_timeout) = idle_timeout {
                if session.is_idle(now, idle_timeout) {
                    report_warn(env.handler.as_ref(), &format!("conv {}: no inbound traffic for more than {:?} - evicting session", conv, idle_timeout));
                    env.handler.on_idle_kick(conv);
                    return false;
                }
            }

            match session.tick(now32, message_buf, &env) {
                Ok(()) => true,
                Err(e) => {
                    report_error(env.handler.as_ref(), &format!("{:#} - dropping session", e));
                    false
                }
            }
        });
    }
}
