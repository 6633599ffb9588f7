//! Session registry: ConnectionId -> Session
//!
//! Invariant: paling banyak satu session per ID. Insert kondisional
//! (hanya jika belum ada) lewat entry API, jadi check-then-insert atomic
//! per key.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{MuxError, Result};
use crate::network::Session;
use crate::protocol::ConnectionId;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<ConnectionId, Arc<dyn Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gagal dengan `DuplicateConnectionId` jika ID sudah terdaftar.
    pub fn insert(&self, id: ConnectionId, session: Arc<dyn Session>) -> Result<()> {
        match self.sessions.entry(id) {
            Entry::Occupied(e) => Err(MuxError::DuplicateConnectionId(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(session);
                Ok(())
            }
        }
    }

    /// Clone `Arc` keluar dari map; shard lock tidak ditahan selama
    /// session memproses datagram.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<dyn Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<dyn Session>> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Tutup setiap session yang ada saat snapshot diambil.
    ///
    /// Setiap session di-`close()` hanya oleh pemanggil yang berhasil
    /// me-`remove` key-nya, jadi tidak ada close ganda meski ada remove
    /// atau close konkuren. Insert setelah snapshot tidak ikut ditutup.
    /// Returns jumlah session yang ditutup.
    pub fn remove_and_close_all(&self) -> usize {
        let mut closed = 0;
        for id in self.connection_ids() {
            if let Some(session) = self.remove(&id) {
                tracing::debug!(cid = %id, "closing session");
                session.close();
                closed += 1;
            }
        }
        closed
    }
}
