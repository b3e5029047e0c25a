use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use anyhow::bail;
use tracing::trace;
use crate::config::EngineConfig;
use crate::engine::{conv_from_header, EngineFactory, EngineOutput, TransportEngine, ENGINE_HEADER_LEN};

/// An engine without any reliability: every inbound datagram's payload becomes one chunk, and
///  every sent payload becomes one outbound datagram when the engine is next updated. This makes
///  chunk boundaries fully controllable from tests.
///
/// Datagrams consist of the conv (u32 LE) followed by zero padding up to [ENGINE_HEADER_LEN],
///  then the payload.
pub struct PassthroughEngine {
    conv: u32,
    interval_millis: u32,
    output: Box<dyn EngineOutput>,
    chunks: VecDeque<Vec<u8>>,
    pending_send: VecDeque<Vec<u8>>,
    next_due: u32,
    num_updates: Arc<AtomicUsize>,
}

impl PassthroughEngine {
    pub const MAX_SEND_LEN: usize = 64 * 1024;

    pub fn datagram(conv: u32, payload: &[u8]) -> Vec<u8> {
        let mut result = Vec::with_capacity(ENGINE_HEADER_LEN + payload.len());
        result.extend_from_slice(&conv.to_le_bytes());
        result.resize(ENGINE_HEADER_LEN, 0);
        result.extend_from_slice(payload);
        result
    }
}

impl TransportEngine for PassthroughEngine {
    fn conv(&self) -> u32 {
        self.conv
    }

    fn input(&mut self, datagram: &[u8]) -> anyhow::Result<()> {
        match conv_from_header(datagram) {
            Some(conv) if conv == self.conv && datagram.len() >= ENGINE_HEADER_LEN => {}
            _ => bail!("not a datagram for conv {}", self.conv),
        }

        let payload = &datagram[ENGINE_HEADER_LEN..];
        if !payload.is_empty() {
            trace!("conv {}: passthrough chunk of {} bytes", self.conv, payload.len());
            self.chunks.push_back(payload.to_vec());
        }
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() > Self::MAX_SEND_LEN {
            bail!("payload of {} bytes exceeds maximum of {}", payload.len(), Self::MAX_SEND_LEN);
        }
        self.pending_send.push_back(payload.to_vec());
        Ok(())
    }

    fn peek_size(&self) -> Option<usize> {
        self.chunks.front()
            .map(|c| c.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let Some(chunk) = self.chunks.front() else {
            bail!("no chunk available");
        };
        if buf.len() < chunk.len() {
            bail!("buffer of {} bytes is too small for chunk of {} bytes", buf.len(), chunk.len());
        }

        let len = chunk.len();
        buf[..len].copy_from_slice(chunk);
        self.chunks.pop_front();
        Ok(len)
    }

    fn check(&self, now: u32) -> u32 {
        if self.pending_send.is_empty() {
            self.next_due
        }
        else {
            now
        }
    }

    fn update(&mut self, now: u32) -> anyhow::Result<()> {
        self.num_updates.fetch_add(1, Ordering::SeqCst);
        while let Some(payload) = self.pending_send.pop_front() {
            self.output.output(&Self::datagram(self.conv, &payload));
        }
        self.next_due = now.wrapping_add(self.interval_millis);
        Ok(())
    }
}

/// Creates [PassthroughEngine]s, counting created engines and their updates
#[derive(Default)]
pub struct PassthroughEngineFactory {
    pub num_created: AtomicUsize,
    pub num_updates: Arc<AtomicUsize>,
}

impl PassthroughEngineFactory {
    pub fn new() -> PassthroughEngineFactory {
        Default::default()
    }
}

impl EngineFactory for PassthroughEngineFactory {
    fn create(&self, conv: u32, config: &EngineConfig, output: Box<dyn EngineOutput>) -> anyhow::Result<Box<dyn TransportEngine>> {
        self.num_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(PassthroughEngine {
            conv,
            interval_millis: config.interval_millis,
            output,
            chunks: Default::default(),
            pending_send: Default::default(),
            next_due: 0,
            num_updates: self.num_updates.clone(),
        }))
    }
}
