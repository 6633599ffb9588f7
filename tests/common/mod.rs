//! Test helpers: scripted endpoint, recording sessions dan factory

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use quicmux::core::PooledBuffers;
use quicmux::network::WriteCompletion;
use quicmux::protocol::HeaderForm;
use quicmux::{
    ConnectionId, DatagramConnection, DatagramEndPoint, DatagramWriter, Fill, MuxConfig, MuxError,
    Result, Session, SessionFactory,
};

pub const CID_LEN: usize = 8;

/// Satu langkah hasil `fill`
pub enum Step {
    Datagram(SocketAddr, Vec<u8>),
    Closed,
    Error(io::ErrorKind),
}

/// Cara endpoint menyelesaikan write
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Completion dipanggil di dalam `write`
    Sync,
    /// Completion disimpan sampai `complete_next`
    Deferred,
    /// Completion dipanggil dari thread lain
    Threaded,
}

pub struct ScriptedEndPoint {
    script: Mutex<VecDeque<Step>>,
    mode: WriteMode,
    /// Write ke-n (0-based) gagal
    fail_at: Mutex<Option<usize>>,
    pub writes: Mutex<Vec<(SocketAddr, Vec<Bytes>)>>,
    deferred: Mutex<VecDeque<WriteCompletion>>,
    inflight: Arc<AtomicUsize>,
    pub max_inflight: Arc<AtomicUsize>,
    pub fill_interested: AtomicUsize,
    pub shutdown_output: AtomicUsize,
    pub fills: AtomicUsize,
    open: AtomicBool,
}

impl ScriptedEndPoint {
    pub fn new(mode: WriteMode) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            mode,
            fail_at: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            deferred: Mutex::new(VecDeque::new()),
            inflight: Arc::new(AtomicUsize::new(0)),
            max_inflight: Arc::new(AtomicUsize::new(0)),
            fill_interested: AtomicUsize::new(0),
            shutdown_output: AtomicUsize::new(0),
            fills: AtomicUsize::new(0),
            open: AtomicBool::new(true),
        })
    }

    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    pub fn push_datagram(&self, from: SocketAddr, datagram: Vec<u8>) {
        self.push(Step::Datagram(from, datagram));
    }

    pub fn fail_write_at(&self, index: usize) {
        *self.fail_at.lock() = Some(index);
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Payload setiap write, buffer digabung
    pub fn written_payloads(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .iter()
            .map(|(_, bufs)| bufs.iter().flat_map(|b| b.iter().copied()).collect())
            .collect()
    }

    pub fn complete_next(&self) -> bool {
        let completion = self.deferred.lock().pop_front();
        match completion {
            Some(completion) => {
                completion(Ok(()));
                true
            }
            None => false,
        }
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.lock().len()
    }
}

impl DatagramEndPoint for ScriptedEndPoint {
    fn fill(&self, buffer: &mut BytesMut) -> io::Result<Fill> {
        assert!(buffer.is_empty(), "buffer must be cleared before fill");
        self.fills.fetch_add(1, Ordering::SeqCst);

        let step = self.script.lock().pop_front();
        match step {
            None => Ok(Fill::Empty),
            Some(Step::Closed) => Ok(Fill::Closed),
            Some(Step::Error(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(Step::Datagram(from, bytes)) => {
                buffer.extend_from_slice(&bytes);
                Ok(Fill::Datagram {
                    len: bytes.len(),
                    from,
                })
            }
        }
    }

    fn write(&self, to: SocketAddr, buffers: Vec<Bytes>, completion: WriteCompletion) {
        let index = {
            let mut writes = self.writes.lock();
            writes.push((to, buffers));
            writes.len() - 1
        };

        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(now, Ordering::SeqCst);

        let inflight = Arc::clone(&self.inflight);
        let fail = *self.fail_at.lock() == Some(index);
        let completion: WriteCompletion = Box::new(move |result| {
            inflight.fetch_sub(1, Ordering::SeqCst);
            if fail {
                completion(Err(io::Error::new(io::ErrorKind::Other, "scripted write failure")));
            } else {
                completion(result);
            }
        });

        match self.mode {
            WriteMode::Sync => completion(Ok(())),
            WriteMode::Deferred => self.deferred.lock().push_back(completion),
            WriteMode::Threaded => {
                std::thread::spawn(move || completion(Ok(())));
            }
        }
    }

    fn fill_interested(&self) {
        self.fill_interested.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown_output(&self) {
        self.shutdown_output.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Session yang mencatat semua datagram
#[derive(Default)]
pub struct RecordingSession {
    pub cid: Mutex<Option<ConnectionId>>,
    pub processed: Mutex<Vec<Vec<u8>>>,
    pub closes: AtomicUsize,
    pub fail_process: AtomicBool,
}

impl Session for RecordingSession {
    fn set_connection_id(&self, id: ConnectionId) {
        *self.cid.lock() = Some(id);
    }

    fn process(&self, _remote: SocketAddr, datagram: &[u8]) -> Result<usize> {
        if self.fail_process.load(Ordering::SeqCst) {
            return Err(MuxError::Session("scripted process failure".into()));
        }
        self.processed.lock().push(datagram.to_vec());
        Ok(datagram.len())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory: long header -> session baru, short header -> tolak
#[derive(Default)]
pub struct RecordingFactory {
    pub calls: Mutex<Vec<Vec<u8>>>,
    pub created: Mutex<Vec<Arc<RecordingSession>>>,
    /// Balas datagram awal lewat writer sebelum session dikembalikan
    pub reply_on_create: AtomicBool,
}

impl RecordingFactory {
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn session(&self, index: usize) -> Arc<RecordingSession> {
        Arc::clone(&self.created.lock()[index])
    }
}

impl SessionFactory for RecordingFactory {
    fn create_session(
        &self,
        writer: &DatagramWriter,
        remote: SocketAddr,
        datagram: &[u8],
    ) -> Result<Option<Arc<dyn Session>>> {
        self.calls.lock().push(datagram.to_vec());
        if HeaderForm::of(datagram) != Some(HeaderForm::Long) {
            return Ok(None);
        }
        if self.reply_on_create.load(Ordering::SeqCst) {
            writer.send(remote, Bytes::copy_from_slice(datagram));
        }
        let session = Arc::new(RecordingSession::default());
        self.created.lock().push(Arc::clone(&session));
        Ok(Some(session))
    }
}

pub fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

pub fn cid(tag: u8) -> Vec<u8> {
    vec![tag; CID_LEN]
}

/// Long header (Initial) dengan DCID `dcid`
pub fn initial(dcid: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0xC0, 0x00, 0x00, 0x00, 0x01, dcid.len() as u8];
    buf.extend_from_slice(dcid);
    buf.push(0); // SCID len
    buf.extend_from_slice(payload);
    buf
}

/// Short header dengan DCID `dcid` (panjang harus CID_LEN)
pub fn short(dcid: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0x40];
    buf.extend_from_slice(dcid);
    buf.extend_from_slice(payload);
    buf
}

pub struct Harness {
    pub endpoint: Arc<ScriptedEndPoint>,
    pub factory: Arc<RecordingFactory>,
    pub pool: Arc<PooledBuffers>,
    pub connection: Arc<DatagramConnection>,
}

impl Harness {
    pub fn new(mode: WriteMode) -> Self {
        let endpoint = ScriptedEndPoint::new(mode);
        let factory = Arc::new(RecordingFactory::default());
        let pool = Arc::new(PooledBuffers::new(8));
        let config = MuxConfig {
            local_cid_len: CID_LEN,
            ..MuxConfig::default()
        };
        let connection = DatagramConnection::new(
            config,
            endpoint.clone(),
            pool.clone(),
            factory.clone(),
        )
        .expect("harness config is valid");
        Self {
            endpoint,
            factory,
            pool,
            connection,
        }
    }
}
