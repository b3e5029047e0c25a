use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use clap::Parser;
use clap_derive::Parser;
use convmux::config::ServerConfig;
use convmux::engine::kcp::KcpEngineFactory;
use convmux::handler::SessionEventHandler;
use convmux::server::Server;
use convmux::validation::Crc32Validator;
use tracing::{info, warn, Level};

/// Echoes every framed message back to the session it came from
#[derive(Parser)]
struct Args {
    #[clap(default_value = "0.0.0.0:9527")]
    bind_address: String,

    /// idle timeout in seconds, 0 disables eviction
    #[clap(long, default_value_t = 15)]
    idle_timeout: u64,

    /// require a CRC-32 header checksum in front of every datagram
    #[clap(long, default_value_t = false)]
    checksum: bool,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[derive(Default)]
struct EchoHandler {
    inbox: Mutex<Vec<(u32, Vec<u8>)>>,
}

impl SessionEventHandler for EchoHandler {
    fn on_message(&self, conv: u32, message: &[u8]) {
        // replies must wait until the tick returns
        self.inbox.lock().unwrap()
            .push((conv, message.to_vec()));
    }

    fn on_idle_kick(&self, conv: u32) {
        info!("conv {} went away", conv);
    }
}

pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let bind_addr: SocketAddr = args.bind_address.parse()?;
    let mut config = ServerConfig::for_addr(bind_addr);
    config.idle_timeout = Some(Duration::from_secs(args.idle_timeout));
    let tick_interval = Duration::from_millis(config.engine.interval_millis as u64);

    let handler = Arc::new(EchoHandler::default());
    let mut server = Server::new(config, Arc::new(KcpEngineFactory), handler.clone());
    if args.checksum {
        server.set_validator(Some(Arc::new(Crc32Validator::new())));
    }
    server.start()?;
    info!("echo server listening on {:?}", server.local_addr()?);

    loop {
        let tick_start = Instant::now();
        server.update();

        let inbox = std::mem::take(&mut *handler.inbox.lock().unwrap());
        for (conv, message) in inbox {
            if let Err(e) = server.send_framed(conv, &message) {
                warn!("echo to conv {} failed: {}", conv, e);
            }
        }

        if let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}
