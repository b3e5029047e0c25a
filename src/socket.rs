use std::io;
use std::net::{SocketAddr, UdpSocket};
use anyhow::Context;
#[cfg(test)] use mockall::automock;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};
use crate::config::ServerConfig;

/// This is an abstraction for the server's non-blocking UDP socket, introduced to facilitate
///  replacing the I/O part for testing
#[cfg_attr(test, automock)]
pub trait DatagramSocket: Send + Sync + 'static {
    /// Non-blocking receive. Returns an error of kind `WouldBlock` when no datagram is queued.
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn send_to(&self, buf: &[u8], to: SocketAddr) -> io::Result<usize>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramSocket for UdpSocket {
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf)
    }

    fn send_to(&self, buf: &[u8], to: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, to)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Create the server's UDP socket: non-blocking, address reuse, kernel buffers sized for a full
///  tick's worth of traffic, bound to the configured address. Any failure here is fatal for
///  starting the server.
pub fn bind_udp_socket(config: &ServerConfig) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(config.bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .context("creating UDP socket")?;
    socket.set_nonblocking(true)
        .context("setting socket to non-blocking")?;
    socket.set_reuse_address(true)
        .context("setting SO_REUSEADDR")?;
    socket.set_recv_buffer_size(config.socket_buffer_size)
        .with_context(|| format!("setting socket receive buffer to {} bytes", config.socket_buffer_size))?;
    socket.set_send_buffer_size(config.socket_buffer_size)
        .with_context(|| format!("setting socket send buffer to {} bytes", config.socket_buffer_size))?;
    debug!("socket buffers: receive {:?}, send {:?}", socket.recv_buffer_size(), socket.send_buffer_size());

    socket.bind(&config.bind_addr.into())
        .with_context(|| format!("binding UDP socket to {:?}", config.bind_addr))?;

    let socket: UdpSocket = socket.into();
    info!("bound UDP socket to {:?}", socket.local_addr()?);
    Ok(socket)
}
