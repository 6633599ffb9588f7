//! MuxServer dengan event-driven I/O
//!
//! Menggunakan mio untuk readiness notification. Readable event
//! menjalankan read loop (hanya jika read interest sudah di-arm ulang),
//! writable event melepas write yang diparkir.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};

use crate::config::MuxConfig;
use crate::core::{ByteBufferPool, PooledBuffers};
use crate::error::Result;
use crate::network::{DatagramConnection, DatagramEndPoint, SessionFactory, UdpEndPoint};

const SOCKET_TOKEN: Token = Token(0);

/// Satu socket UDP + connection-nya + event loop
pub struct MuxServer {
    poll: Poll,
    events: Events,
    endpoint: Arc<UdpEndPoint>,
    connection: Arc<DatagramConnection>,
    config: MuxConfig,
}

impl MuxServer {
    /// Bind socket dan daftarkan ke poll
    pub fn bind(config: MuxConfig, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        config.validate()?;
        let poll = Poll::new()?;
        let mut endpoint = UdpEndPoint::bind(config.bind_addr, config.socket_buffer_size)?;
        poll.registry().register(
            endpoint.socket_mut(),
            SOCKET_TOKEN,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        let endpoint = Arc::new(endpoint);
        let pool: Arc<dyn ByteBufferPool> = Arc::new(PooledBuffers::new(config.pool_capacity));
        let connection = DatagramConnection::new(
            config.clone(),
            Arc::clone(&endpoint) as Arc<dyn DatagramEndPoint>,
            pool,
            factory,
        )?;

        tracing::info!(addr = %endpoint.local_addr(), "quicmux endpoint bound");

        Ok(Self {
            poll,
            events: Events::with_capacity(config.events_capacity),
            endpoint,
            connection,
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    pub fn connection(&self) -> &Arc<DatagramConnection> {
        &self.connection
    }

    /// Satu putaran poll. Returns jumlah event yang diproses.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e.into()),
        }

        let mut handled = 0;
        for event in self.events.iter() {
            if event.token() != SOCKET_TOKEN {
                continue;
            }
            handled += 1;
            if event.is_writable() {
                self.endpoint.on_writable();
            }
            if event.is_readable() && self.endpoint.take_fill_interest() {
                self.connection.on_fillable();
            }
        }
        Ok(handled)
    }

    /// Event loop sampai `shutdown` di-set atau connection ditutup.
    /// Connection selalu ditutup saat keluar.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let start = Instant::now();
        let mut last_stats = Instant::now();

        let result = loop {
            if shutdown.load(Ordering::Acquire) || self.connection.is_closed() {
                break Ok(());
            }
            if let Err(e) = self.run_once(Some(self.config.poll_timeout)) {
                break Err(e);
            }
            if last_stats.elapsed() > self.config.stats_interval {
                self.connection
                    .stats()
                    .log_stats(start.elapsed(), self.connection.sessions().len());
                last_stats = Instant::now();
            }
        };

        self.connection.close();
        tracing::info!(addr = %self.local_addr(), "quicmux endpoint stopped");
        result
    }
}
