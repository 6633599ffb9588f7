//! Connection: demultiplexer + flusher untuk satu endpoint UDP
//!
//! Read loop (`on_fillable`) menguras endpoint tanpa blocking, parse
//! connection ID dari setiap datagram, lalu routing ke session yang
//! terdaftar atau ke `SessionFactory` untuk ID yang belum dikenal.
//! Semua write keluar lewat satu `Flusher`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};

use crate::config::MuxConfig;
use crate::core::{ByteBufferPool, MuxStats};
use crate::error::{MuxError, Result};
use crate::network::{
    DatagramEndPoint, DatagramWriter, Fill, Flusher, FlusherState, SessionFactory,
    SessionRegistry,
};
use crate::protocol::ConnectionId;

/// Kenapa read loop berhenti
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    /// Input ditutup permanen
    Closed,
    /// Tidak ada data lagi untuk sekarang
    Empty,
}

pub struct DatagramConnection {
    config: MuxConfig,
    endpoint: Arc<dyn DatagramEndPoint>,
    pool: Arc<dyn ByteBufferPool>,
    factory: Arc<dyn SessionFactory>,
    sessions: SessionRegistry,
    flusher: Arc<Flusher>,
    stats: Arc<MuxStats>,
    closed: AtomicBool,
}

impl DatagramConnection {
    /// Gagal dengan `MuxError::Config` jika `config` tidak valid.
    pub fn new(
        config: MuxConfig,
        endpoint: Arc<dyn DatagramEndPoint>,
        pool: Arc<dyn ByteBufferPool>,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let stats = Arc::new(MuxStats::new());

        Ok(Arc::new_cyclic(|this: &Weak<Self>| {
            // Write gagal = connection ditutup
            let this = this.clone();
            let on_failure = Box::new(move || {
                if let Some(connection) = this.upgrade() {
                    connection.close();
                }
            });

            Self {
                flusher: Arc::new(Flusher::with_failure_hook(
                    Arc::clone(&endpoint),
                    Arc::clone(&stats),
                    on_failure,
                )),
                config,
                endpoint,
                pool,
                factory,
                sessions: SessionRegistry::new(),
                stats,
                closed: AtomicBool::new(false),
            }
        }))
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<dyn ByteBufferPool> {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn stats(&self) -> &MuxStats {
        &self.stats
    }

    pub fn flusher_state(&self) -> FlusherState {
        self.flusher.state()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Handle write untuk session
    pub fn writer(&self) -> DatagramWriter {
        DatagramWriter::new(Arc::clone(&self.flusher))
    }

    /// Submit satu datagram (satu atau lebih buffer) ke flusher.
    pub fn write<F>(&self, callback: F, address: SocketAddr, buffers: Vec<Bytes>)
    where
        F: FnOnce(std::result::Result<(), MuxError>) + Send + 'static,
    {
        self.flusher.offer(Box::new(callback), address, buffers);
    }

    /// Dipanggil event loop saat endpoint readable.
    ///
    /// Buffer dipinjam sekali dan dikembalikan tepat sekali di semua
    /// jalur keluar. Error tak terduga di-log dan menghentikan invocation
    /// ini saja; read interest di-arm ulang selama endpoint masih terbuka.
    pub fn on_fillable(&self) {
        let mut buffer = self
            .pool
            .acquire(self.config.read_buffer_size, self.config.direct_buffers);

        let outcome = self.fill_loop(&mut buffer);
        self.pool.release(buffer);

        match outcome {
            Ok(ReadOutcome::Closed) => {
                tracing::debug!("input shut down, shutting down output");
                self.endpoint.shutdown_output();
            }
            Ok(ReadOutcome::Empty) => self.endpoint.fill_interested(),
            Err(e) => {
                tracing::debug!(error = %e, "read loop aborted");
                if self.endpoint.is_open() {
                    self.endpoint.fill_interested();
                }
            }
        }
    }

    fn fill_loop(&self, buffer: &mut BytesMut) -> Result<ReadOutcome> {
        loop {
            buffer.clear();
            let (len, remote) = match self.endpoint.fill(buffer)? {
                Fill::Closed => return Ok(ReadOutcome::Closed),
                Fill::Empty => return Ok(ReadOutcome::Empty),
                Fill::Datagram { len, from } => (len, from),
            };

            MuxStats::incr(&self.stats.datagrams_received);
            self.stats
                .bytes_received
                .fetch_add(len as u64, Ordering::Relaxed);
            tracing::trace!(peer = %remote, len, "datagram received");

            let datagram = &buffer[..len];
            self.dispatch(remote, datagram)?;
        }
    }

    fn dispatch(&self, remote: SocketAddr, datagram: &[u8]) -> Result<()> {
        let Some(cid) = ConnectionId::from_packet(datagram, self.config.local_cid_len) else {
            MuxStats::incr(&self.stats.datagrams_dropped);
            tracing::debug!(peer = %remote, "undecipherable connection ID, dropping datagram");
            return Ok(());
        };

        if let Some(session) = self.sessions.lookup(&cid) {
            let consumed = session.process(remote, datagram)?;
            tracing::trace!(%cid, consumed, "datagram processed by session");
            return Ok(());
        }

        tracing::debug!(%cid, peer = %remote, "unknown connection ID, trying to create session");
        let writer = self.writer();
        let Some(session) = self.factory.create_session(&writer, remote, datagram)? else {
            MuxStats::incr(&self.stats.sessions_declined);
            tracing::debug!(%cid, "session not created");
            return Ok(());
        };

        session.set_connection_id(cid.clone());

        // Factory boleh write; write gagal menutup connection di tengah jalan
        if self.is_closed() {
            tracing::debug!(%cid, "connection closed during session creation");
            session.close();
            return Ok(());
        }

        match self.sessions.insert(cid.clone(), Arc::clone(&session)) {
            Ok(()) => {
                if self.is_closed() {
                    // close() konkuren mungkin sudah mengambil snapshot registry;
                    // siapa pun yang berhasil remove yang menutup session.
                    if let Some(session) = self.sessions.remove(&cid) {
                        session.close();
                    }
                    return Ok(());
                }
                MuxStats::incr(&self.stats.sessions_created);
                tracing::debug!(%cid, "session created");
            }
            Err(e) => {
                MuxStats::incr(&self.stats.datagrams_dropped);
                tracing::warn!(error = %e, "discarding new session");
                session.close();
            }
        }
        Ok(())
    }

    /// Session yang menutup dirinya sendiri (idle timeout, close protokol)
    /// melepas entry-nya di registry. `Session::close` tidak dipanggil
    /// lagi di sini.
    pub fn close_session(&self, cid: &ConnectionId, cause: Option<&MuxError>) {
        match cause {
            Some(e) => tracing::debug!(%cid, error = %e, "closing session"),
            None => tracing::debug!(%cid, "closing session"),
        }
        if self.sessions.remove(cid).is_some() {
            MuxStats::incr(&self.stats.sessions_closed);
        }
    }

    /// Tutup semua session (tepat sekali per session), terminate
    /// flusher, lalu tutup endpoint. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("closing connection");

        let closed = self.sessions.remove_and_close_all();
        self.stats
            .sessions_closed
            .fetch_add(closed as u64, Ordering::Relaxed);

        self.flusher.close();
        self.endpoint.close();
        tracing::debug!(sessions = closed, "connection closed");
    }
}
