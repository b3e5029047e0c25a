//! Adapter for the `kcp` crate, enabled by the `kcp` feature.

use std::io;
use std::io::Write;
use anyhow::anyhow;
use ::kcp::Kcp;
use tracing::trace;
use crate::config::EngineConfig;
use crate::engine::{EngineFactory, EngineOutput, TransportEngine};

/// `Kcp` writes its datagrams to an `io::Write`
struct KcpOutput(Box<dyn EngineOutput>);

impl Write for KcpOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.output(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct KcpEngine {
    kcp: Kcp<KcpOutput>,
}

impl TransportEngine for KcpEngine {
    fn conv(&self) -> u32 {
        self.kcp.conv()
    }

    fn input(&mut self, datagram: &[u8]) -> anyhow::Result<()> {
        let consumed = self.kcp.input(datagram)
            .map_err(|e| anyhow!("kcp rejected input of {} bytes: {:?}", datagram.len(), e))?;
        trace!("kcp consumed {} of {} input bytes", consumed, datagram.len());
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        self.kcp.send(payload)
            .map_err(|e| anyhow!("kcp rejected {} bytes for sending: {:?}", payload.len(), e))?;
        Ok(())
    }

    fn peek_size(&self) -> Option<usize> {
        self.kcp.peeksize().ok()
    }

    fn recv(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        self.kcp.recv(buf)
            .map_err(|e| anyhow!("kcp recv failed: {:?}", e))
    }

    /// `Kcp::check` returns the delay until the next update rather than an absolute tick
    fn check(&self, now: u32) -> u32 {
        now.wrapping_add(self.kcp.check(now))
    }

    fn update(&mut self, now: u32) -> anyhow::Result<()> {
        self.kcp.update(now)
            .map_err(|e| anyhow!("kcp update failed: {:?}", e))
    }
}

#[derive(Debug, Default)]
pub struct KcpEngineFactory;

impl EngineFactory for KcpEngineFactory {
    fn create(&self, conv: u32, config: &EngineConfig, output: Box<dyn EngineOutput>) -> anyhow::Result<Box<dyn TransportEngine>> {
        let mut kcp = Kcp::new(conv, KcpOutput(output));
        kcp.set_nodelay(config.no_delay, config.interval_millis as i32, config.fast_resend as i32, config.no_congestion_control);
        kcp.set_wndsize(config.send_window, config.receive_window);
        kcp.set_mtu(config.mtu)
            .map_err(|e| anyhow!("invalid kcp MTU {}: {:?}", config.mtu, e))?;

        Ok(Box::new(KcpEngine { kcp }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use rstest::rstest;

    struct CollectingOutput(Arc<Mutex<Vec<Vec<u8>>>>);
    impl EngineOutput for CollectingOutput {
        fn output(&mut self, datagram: &[u8]) {
            self.0.lock().unwrap().push(datagram.to_vec());
        }
    }

    #[test]
    fn test_kcp_round_trip() {
        let a_out = Arc::new(Mutex::new(Vec::new()));
        let b_out = Arc::new(Mutex::new(Vec::new()));

        let config = EngineConfig::fast_mode();
        let mut a = KcpEngineFactory.create(7, &config, Box::new(CollectingOutput(a_out.clone()))).unwrap();
        let mut b = KcpEngineFactory.create(7, &config, Box::new(CollectingOutput(b_out.clone()))).unwrap();

        a.send(b"hello").unwrap();
        a.update(0).unwrap();

        for datagram in a_out.lock().unwrap().drain(..) {
            assert_eq!(crate::engine::conv_from_header(&datagram), Some(7));
            b.input(&datagram).unwrap();
        }

        assert_eq!(b.peek_size(), Some(5));
        let mut buf = [0u8; 16];
        assert_eq!(b.recv(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(b.peek_size(), None);
    }

    #[rstest]
    #[case::low_half(1_000)]
    #[case::high_half(0x8000_0000 + 1_000)]
    #[case::top_of_range(0xF000_0000)]
    fn test_check_returns_absolute_tick(#[case] now: u32) {
        let config = EngineConfig::fast_mode();
        let mut engine = KcpEngineFactory.create(7, &config, Box::new(CollectingOutput(Default::default()))).unwrap();

        // never updated: due right away
        assert_eq!(engine.check(now), now);

        engine.update(now).unwrap();
        let delay = engine.check(now).wrapping_sub(now);
        assert!(delay > 0 && delay <= config.interval_millis, "delay {} after update", delay);

        let later = now + config.interval_millis;
        assert_eq!(engine.check(later).wrapping_sub(later), 0);
    }
}
