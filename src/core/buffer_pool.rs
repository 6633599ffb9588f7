//! Buffer pool untuk read loop
//!
//! Buffer dipinjam sekali per invocation read loop dan dikembalikan
//! tepat sekali di setiap jalur keluar (termasuk jalur error).
//! Setelah `release`, pemanggil tidak boleh memakai buffer itu lagi;
//! ownership `BytesMut` memastikan hal ini di compile time.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;

/// Kontrak pool: acquire / release.
pub trait ByteBufferPool: Send + Sync {
    /// Pinjam buffer kosong dengan kapasitas minimal `min_size`.
    fn acquire(&self, min_size: usize, direct: bool) -> BytesMut;

    /// Kembalikan buffer ke pool.
    fn release(&self, buffer: BytesMut);
}

/// Pool sederhana dengan free-list terbatas.
///
/// Hint `direct` diabaikan: semua `BytesMut` dialokasikan di heap.
pub struct PooledBuffers {
    free: Mutex<Vec<BytesMut>>,
    max_retained: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl PooledBuffers {
    pub fn new(max_retained: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_retained)),
            max_retained,
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        }
    }

    /// Total acquire sejak pool dibuat
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Total release sejak pool dibuat
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Buffer yang sedang dipinjam (acquire - release)
    pub fn outstanding(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }

    /// Jumlah buffer yang tersimpan di free-list
    pub fn retained(&self) -> usize {
        self.free.lock().len()
    }
}

impl Default for PooledBuffers {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ByteBufferPool for PooledBuffers {
    fn acquire(&self, min_size: usize, _direct: bool) -> BytesMut {
        self.acquired.fetch_add(1, Ordering::Relaxed);

        let reused = {
            let mut free = self.free.lock();
            let idx = free.iter().position(|b| b.capacity() >= min_size);
            idx.map(|idx| free.swap_remove(idx))
        };

        match reused {
            Some(mut buffer) => {
                buffer.clear();
                buffer
            }
            None => BytesMut::with_capacity(min_size),
        }
    }

    fn release(&self, mut buffer: BytesMut) {
        self.released.fetch_add(1, Ordering::Relaxed);
        buffer.clear();

        // Buffer tanpa kapasitas (mis. hasil split) tidak layak disimpan
        if buffer.capacity() == 0 {
            return;
        }

        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buffer);
        }
    }
}
