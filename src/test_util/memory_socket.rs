use std::collections::VecDeque;
use std::io;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::socket::DatagramSocket;

/// A [DatagramSocket] backed by in-memory queues: tests push inbound datagrams and inspect what
///  was sent.
pub struct MemorySocket {
    local_addr: SocketAddr,
    inbound: Mutex<VecDeque<io::Result<(Vec<u8>, SocketAddr)>>>,
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    fail_sends: AtomicBool,
}

impl Default for MemorySocket {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySocket {
    pub fn new() -> MemorySocket {
        MemorySocket {
            local_addr: SocketAddr::from(([127, 0, 0, 1], crate::config::ServerConfig::DEFAULT_PORT)),
            inbound: Default::default(),
            sent: Default::default(),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn push_inbound(&self, from: SocketAddr, datagram: &[u8]) {
        self.inbound.lock().unwrap()
            .push_back(Ok((datagram.to_vec(), from)));
    }

    /// The error is returned by a single receive call, in order with queued datagrams
    pub fn push_inbound_error(&self, kind: ErrorKind) {
        self.inbound.lock().unwrap()
            .push_back(Err(io::Error::from(kind)));
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.lock().unwrap().len()
    }

    /// remove and return all datagrams sent so far
    pub fn take_sent(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl DatagramSocket for MemorySocket {
    fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (datagram, from) = match self.inbound.lock().unwrap().pop_front() {
            Some(entry) => entry?,
            None => return Err(ErrorKind::WouldBlock.into()),
        };

        // UDP semantics: excess bytes are discarded
        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok((len, from))
    }

    fn send_to(&self, buf: &[u8], to: SocketAddr) -> io::Result<usize> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(ErrorKind::Other, "simulated send failure"));
        }
        self.sent.lock().unwrap()
            .push((to, buf.to_vec()));
        Ok(buf.len())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }
}
