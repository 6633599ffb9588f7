//! Flusher: serializer write single-flight per endpoint
//!
//! State machine:
//! ```text
//!            offer()                 write() returned
//!   IDLE ─────────────▶ ITERATING ───────────────────▶ PENDING
//!    ▲                   │     ▲                          │
//!    │   queue kosong    │     │ completion sinkron       │ completion
//!    └───────────────────┘     └──────── CALLED ◀─────────┘ (async → ITERATING)
//!
//!   * ──(write gagal / close)──▶ TERMINATED
//! ```
//!
//! - Paling banyak satu write in-flight.
//! - Entry dikirim ke endpoint dalam urutan FIFO submit.
//! - Lock queue hanya dipegang di sekitar push/pop, tidak pernah
//!   selama memanggil endpoint atau callback.
//! - Completion sinkron (di dalam `endpoint.write`) tidak menimbulkan
//!   rekursi: thread yang sedang iterasi melanjutkan loop-nya.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::core::MuxStats;
use crate::error::MuxError;
use crate::network::DatagramEndPoint;

/// Callback per write. Dipanggil tepat satu kali.
pub type WriteCallback = Box<dyn FnOnce(Result<(), MuxError>) + Send>;

/// Hook yang dipanggil sekali saat write gagal (menutup connection).
pub(crate) type FailureHook = Box<dyn Fn() + Send + Sync>;

const IDLE: u8 = 0;
/// Satu thread sedang mengambil entry dari queue
const ITERATING: u8 = 1;
/// Write sudah diserahkan ke endpoint, menunggu completion
const PENDING: u8 = 2;
/// Completion datang sebelum thread iterasi selesai dengan `write`
const CALLED: u8 = 3;
const TERMINATED: u8 = 4;

/// State publik flusher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlusherState {
    Idle,
    Processing,
    Terminating,
}

/// Satu transmisi yang menunggu giliran
pub struct WriteEntry {
    callback: WriteCallback,
    address: SocketAddr,
    buffers: Vec<Bytes>,
}

impl WriteEntry {
    pub fn new(callback: WriteCallback, address: SocketAddr, buffers: Vec<Bytes>) -> Self {
        Self {
            callback,
            address,
            buffers,
        }
    }
}

pub struct Flusher {
    endpoint: Arc<dyn DatagramEndPoint>,
    state: AtomicU8,
    queue: Mutex<VecDeque<WriteEntry>>,
    /// Callback milik write yang sedang in-flight
    current: Mutex<Option<WriteCallback>>,
    on_failure: FailureHook,
    stats: Arc<MuxStats>,
}

impl Flusher {
    pub fn new(endpoint: Arc<dyn DatagramEndPoint>, stats: Arc<MuxStats>) -> Self {
        Self::with_failure_hook(endpoint, stats, Box::new(|| {}))
    }

    pub(crate) fn with_failure_hook(
        endpoint: Arc<dyn DatagramEndPoint>,
        stats: Arc<MuxStats>,
        on_failure: FailureHook,
    ) -> Self {
        Self {
            endpoint,
            state: AtomicU8::new(IDLE),
            queue: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            on_failure,
            stats,
        }
    }

    pub fn state(&self) -> FlusherState {
        match self.state.load(Ordering::Acquire) {
            IDLE => FlusherState::Idle,
            TERMINATED => FlusherState::Terminating,
            _ => FlusherState::Processing,
        }
    }

    /// Jumlah entry yang belum dikirim ke endpoint
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Masukkan write ke ekor queue lalu minta progress.
    ///
    /// Submit saat TERMINATED tetap di-enqueue, lalu langsung di-drain
    /// dengan `MuxError::Closed`.
    pub fn offer(self: &Arc<Self>, callback: WriteCallback, address: SocketAddr, buffers: Vec<Bytes>) {
        MuxStats::incr(&self.stats.writes_submitted);
        self.queue
            .lock()
            .push_back(WriteEntry::new(callback, address, buffers));
        self.iterate();
    }

    /// Make-progress. No-op jika thread lain sedang iterasi atau ada
    /// write in-flight; pihak tersebut akan mengambil entry berikutnya.
    pub fn iterate(self: &Arc<Self>) {
        match self
            .state
            .compare_exchange(IDLE, ITERATING, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => self.process(),
            Err(TERMINATED) => self.fail_queued(),
            Err(_) => {}
        }
    }

    /// Terminate dari luar (connection ditutup). Tidak memanggil hook.
    ///
    /// Write yang sedang in-flight tetap mendapat completion dari
    /// endpoint; semua yang masih di queue gagal dengan `Closed`.
    pub fn close(&self) {
        self.state.store(TERMINATED, Ordering::Release);
        self.fail_queued();
    }

    /// Loop iterasi. Pemanggil memegang state ITERATING.
    fn process(self: &Arc<Self>) {
        loop {
            let entry = self.queue.lock().pop_front();

            let Some(entry) = entry else {
                if self
                    .state
                    .compare_exchange(ITERATING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Hanya TERMINATED yang bisa merebut state dari ITERATING
                    self.fail_queued();
                    return;
                }
                // Producer yang push setelah pop di atas melihat ITERATING
                // dan mundur; cek ulang agar entry-nya tidak tertinggal.
                if self.queue.lock().is_empty() {
                    return;
                }
                match self
                    .state
                    .compare_exchange(IDLE, ITERATING, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => continue,
                    Err(TERMINATED) => {
                        self.fail_queued();
                        return;
                    }
                    // Thread lain sudah mengambil alih
                    Err(_) => return,
                }
            };

            // close() bisa mendarat setelah pop; entry ini tidak boleh dikirim
            if self.state.load(Ordering::Acquire) == TERMINATED {
                MuxStats::incr(&self.stats.writes_failed);
                (entry.callback)(Err(MuxError::Closed));
                self.fail_queued();
                return;
            }

            *self.current.lock() = Some(entry.callback);

            tracing::trace!(
                to = %entry.address,
                buffers = entry.buffers.len(),
                "flushing datagram"
            );

            let flusher = Arc::clone(self);
            self.endpoint.write(
                entry.address,
                entry.buffers,
                Box::new(move |result| flusher.complete(result)),
            );

            match self
                .state
                .compare_exchange(ITERATING, PENDING, Ordering::AcqRel, Ordering::Acquire)
            {
                // Completion akan datang belakangan
                Ok(_) => return,
                Err(CALLED) => {
                    // Completion sinkron sudah selesai; lanjut ke entry berikutnya
                    match self.state.compare_exchange(
                        CALLED,
                        ITERATING,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => continue,
                        Err(_) => {
                            self.fail_queued();
                            return;
                        }
                    }
                }
                Err(TERMINATED) => {
                    self.fail_queued();
                    return;
                }
                Err(state) => {
                    tracing::error!(state, "flusher in unexpected state after write");
                    return;
                }
            }
        }
    }

    fn complete(self: &Arc<Self>, result: io::Result<()>) {
        let callback = self.current.lock().take();

        match result {
            Ok(()) => {
                MuxStats::incr(&self.stats.writes_completed);
                if let Some(callback) = callback {
                    callback(Ok(()));
                }
                self.succeeded();
            }
            Err(e) => {
                MuxStats::incr(&self.stats.writes_failed);
                tracing::warn!(error = %e, "datagram write failed, closing connection");
                if let Some(callback) = callback {
                    callback(Err(MuxError::Io(e)));
                }
                self.failed();
            }
        }
    }

    fn succeeded(self: &Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                ITERATING => {
                    // Masih di dalam endpoint.write(); biarkan loop iterasi lanjut
                    if self
                        .state
                        .compare_exchange(ITERATING, CALLED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                PENDING => {
                    if self
                        .state
                        .compare_exchange(PENDING, ITERATING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.process();
                        return;
                    }
                }
                TERMINATED => {
                    self.fail_queued();
                    return;
                }
                state => {
                    tracing::error!(state, "write completion in unexpected flusher state");
                    return;
                }
            }
        }
    }

    fn failed(&self) {
        let previous = self.state.swap(TERMINATED, Ordering::AcqRel);
        self.fail_queued();
        if previous != TERMINATED {
            (self.on_failure)();
        }
    }

    /// Drain queue; setiap callback gagal dengan `Closed`.
    fn fail_queued(&self) {
        let drained: Vec<WriteEntry> = self.queue.lock().drain(..).collect();
        if drained.is_empty() {
            return;
        }
        tracing::debug!(count = drained.len(), "failing queued writes");
        for entry in drained {
            MuxStats::incr(&self.stats.writes_failed);
            (entry.callback)(Err(MuxError::Closed));
        }
    }
}

/// Handle cloneable untuk submit write ke flusher milik satu connection.
#[derive(Clone)]
pub struct DatagramWriter {
    flusher: Arc<Flusher>,
}

impl DatagramWriter {
    pub(crate) fn new(flusher: Arc<Flusher>) -> Self {
        Self { flusher }
    }

    pub fn write<F>(&self, callback: F, address: SocketAddr, buffers: Vec<Bytes>)
    where
        F: FnOnce(Result<(), MuxError>) + Send + 'static,
    {
        self.flusher.offer(Box::new(callback), address, buffers);
    }

    /// Fire-and-forget; kegagalan hanya terlihat lewat log.
    pub fn send(&self, address: SocketAddr, datagram: Bytes) {
        self.write(
            move |result| {
                if let Err(e) = result {
                    tracing::debug!(to = %address, error = %e, "datagram not sent");
                }
            },
            address,
            vec![datagram],
        );
    }
}
