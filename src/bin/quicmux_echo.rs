//! quicmux echo server
//!
//! Menerima datagram QUIC di satu socket UDP, membuat satu session per
//! connection ID (hanya dari Initial packet), dan memantulkan setiap
//! datagram kembali ke pengirimnya lewat flusher.
//!
//! Usage:
//!   cargo run --release --bin quicmux_echo -- --bind 0.0.0.0:4433
//!
//! Log level via RUST_LOG (default: info).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quicmux::protocol::{HeaderForm, MIN_CLIENT_INITIAL_LEN};
use quicmux::{
    ConnectionId, DatagramWriter, MuxConfig, MuxError, MuxServer, Result, Session, SessionFactory,
};

/// Datagram echo server di atas quicmux
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: SocketAddr,

    /// Read buffer size per datagram (min 1200)
    #[arg(long, default_value_t = 1500)]
    read_buffer: usize,

    /// Short header connection ID length
    #[arg(long, default_value_t = quicmux::config::DEFAULT_LOCAL_CID_LEN)]
    cid_len: usize,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = 1024)]
    max_sessions: usize,

    /// Stop after N seconds (0 = run forever)
    #[arg(long, default_value_t = 0)]
    duration: u64,

    /// Stats interval in seconds
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,
}

/// Session yang memantulkan datagram
struct EchoSession {
    cid: OnceLock<ConnectionId>,
    remote: SocketAddr,
    writer: DatagramWriter,
    closed: AtomicBool,
    echoed: AtomicU64,
    active: Arc<AtomicU64>,
}

impl Session for EchoSession {
    fn set_connection_id(&self, id: ConnectionId) {
        let _ = self.cid.set(id);
    }

    fn process(&self, remote: SocketAddr, datagram: &[u8]) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MuxError::Session("session closed".into()));
        }
        if remote != self.remote {
            tracing::debug!(from = %self.remote, to = %remote, "peer address changed");
        }
        self.writer.send(remote, Bytes::copy_from_slice(datagram));
        self.echoed.fetch_add(1, Ordering::Relaxed);
        Ok(datagram.len())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.active.fetch_sub(1, Ordering::Relaxed);
        if let Some(cid) = self.cid.get() {
            tracing::info!(
                %cid,
                peer = %self.remote,
                echoed = self.echoed.load(Ordering::Relaxed),
                "session closed"
            );
        }
    }
}

/// Server-side factory: hanya long header Initial yang membuka session
struct EchoFactory {
    max_sessions: u64,
    active: Arc<AtomicU64>,
}

impl EchoFactory {
    fn is_initial(datagram: &[u8]) -> bool {
        // Long header, packet type 0b00 (Initial) pada QUIC v1
        HeaderForm::of(datagram) == Some(HeaderForm::Long)
            && datagram[0] & 0x30 == 0
            && datagram.len() >= MIN_CLIENT_INITIAL_LEN
    }
}

impl SessionFactory for EchoFactory {
    fn create_session(
        &self,
        writer: &DatagramWriter,
        remote: SocketAddr,
        datagram: &[u8],
    ) -> Result<Option<Arc<dyn Session>>> {
        if !Self::is_initial(datagram) {
            return Ok(None);
        }
        if self.active.load(Ordering::Relaxed) >= self.max_sessions {
            tracing::warn!(peer = %remote, "session limit reached, rejecting");
            return Ok(None);
        }
        self.active.fetch_add(1, Ordering::Relaxed);

        tracing::info!(peer = %remote, "new session");
        writer.send(remote, Bytes::copy_from_slice(datagram));

        Ok(Some(Arc::new(EchoSession {
            cid: OnceLock::new(),
            remote,
            writer: writer.clone(),
            closed: AtomicBool::new(false),
            echoed: AtomicU64::new(1),
            active: Arc::clone(&self.active),
        })))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = MuxConfig {
        bind_addr: cli.bind,
        read_buffer_size: cli.read_buffer,
        local_cid_len: cli.cid_len,
        stats_interval: Duration::from_secs(cli.stats_interval.max(1)),
        ..MuxConfig::default()
    };

    let factory = Arc::new(EchoFactory {
        max_sessions: cli.max_sessions as u64,
        active: Arc::new(AtomicU64::new(0)),
    });

    let mut server = match MuxServer::bind(config, factory) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start");
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    if cli.duration > 0 {
        let shutdown = Arc::clone(&shutdown);
        let duration = Duration::from_secs(cli.duration);
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            shutdown.store(true, Ordering::Release);
        });
    }

    if let Err(e) = server.run(&shutdown) {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
