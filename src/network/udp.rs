//! UDP endpoint di atas mio
//!
//! - Non-blocking `recv_from` / `send_to`
//! - Read interest berupa flag atomic yang dikonsumsi event loop
//! - Write yang kena WouldBlock diparkir sampai socket writable

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use mio::net::UdpSocket;
use parking_lot::Mutex;

use crate::network::{DatagramEndPoint, Fill, WriteCompletion};

/// Write yang menunggu socket writable
struct ParkedWrite {
    to: SocketAddr,
    datagram: Bytes,
    completion: WriteCompletion,
}

pub struct UdpEndPoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    fill_interest: AtomicBool,
    input_open: AtomicBool,
    output_open: AtomicBool,
    parked: Mutex<Option<ParkedWrite>>,
}

impl UdpEndPoint {
    /// Bind socket UDP non-blocking
    pub fn bind(addr: SocketAddr, socket_buffer_size: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        configure_socket_buffers(&socket, socket_buffer_size);
        Self::from_socket(socket)
    }

    pub fn from_socket(socket: UdpSocket) -> io::Result<Self> {
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket,
            local_addr,
            // Armed dari awal: readable event pertama langsung diproses
            fill_interest: AtomicBool::new(true),
            input_open: AtomicBool::new(true),
            output_open: AtomicBool::new(true),
            parked: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Untuk registrasi ke `mio::Poll`
    pub fn socket_mut(&mut self) -> &mut UdpSocket {
        &mut self.socket
    }

    /// Konsumsi read interest. Event loop memanggil `on_fillable` hanya
    /// jika ini `true`.
    pub fn take_fill_interest(&self) -> bool {
        self.fill_interest.swap(false, Ordering::AcqRel)
    }

    /// Coba kirim ulang write yang diparkir. Dipanggil saat writable.
    ///
    /// Lock `parked` dipegang selama keputusan kirim-atau-parkir, sama
    /// seperti di `write`; completion selalu dipanggil setelah lock dilepas.
    pub fn on_writable(&self) {
        let mut slot = self.parked.lock();
        let Some(parked) = slot.take() else {
            return;
        };

        if !self.output_open.load(Ordering::Acquire) {
            drop(slot);
            (parked.completion)(Err(closed_error()));
            return;
        }

        match self.socket.send_to(&parked.datagram, parked.to) {
            Ok(_) => {
                drop(slot);
                (parked.completion)(Ok(()))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                *slot = Some(parked);
            }
            Err(e) => {
                drop(slot);
                (parked.completion)(Err(e))
            }
        }
    }

    /// Ada write yang menunggu socket writable
    pub fn has_parked_write(&self) -> bool {
        self.parked.lock().is_some()
    }

    fn gather(buffers: Vec<Bytes>) -> Bytes {
        if buffers.len() == 1 {
            return buffers.into_iter().next().unwrap_or_default();
        }
        let total = buffers.iter().map(Bytes::len).sum();
        let mut datagram = BytesMut::with_capacity(total);
        for buf in &buffers {
            datagram.extend_from_slice(buf);
        }
        datagram.freeze()
    }
}

impl DatagramEndPoint for UdpEndPoint {
    fn fill(&self, buffer: &mut BytesMut) -> io::Result<Fill> {
        if !self.input_open.load(Ordering::Acquire) {
            return Ok(Fill::Closed);
        }

        let capacity = buffer.capacity();
        buffer.resize(capacity, 0);

        match self.socket.recv_from(&mut buffer[..]) {
            Ok((len, from)) => {
                buffer.truncate(len);
                Ok(Fill::Datagram { len, from })
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                buffer.clear();
                Ok(Fill::Empty)
            }
            Err(e) => {
                buffer.clear();
                Err(e)
            }
        }
    }

    fn write(&self, to: SocketAddr, buffers: Vec<Bytes>, completion: WriteCompletion) {
        let datagram = Self::gather(buffers);

        // Writable edge yang datang di antara WouldBlock dan parkir akan
        // menunggu lock ini, lalu menemukan write yang sudah diparkir.
        let mut slot = self.parked.lock();
        if !self.output_open.load(Ordering::Acquire) {
            drop(slot);
            completion(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output shut down",
            )));
            return;
        }

        match self.socket.send_to(&datagram, to) {
            Ok(_) => {
                drop(slot);
                completion(Ok(()))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                // Flusher single-flight: paling banyak satu write diparkir
                *slot = Some(ParkedWrite {
                    to,
                    datagram,
                    completion,
                });
            }
            Err(e) => {
                drop(slot);
                completion(Err(e))
            }
        }
    }

    fn fill_interested(&self) {
        self.fill_interest.store(true, Ordering::Release);
    }

    fn shutdown_output(&self) {
        self.output_open.store(false, Ordering::Release);
    }

    fn close(&self) {
        self.input_open.store(false, Ordering::Release);
        self.output_open.store(false, Ordering::Release);

        let parked = self.parked.lock().take();
        if let Some(parked) = parked {
            (parked.completion)(Err(closed_error()));
        }
    }

    fn is_open(&self) -> bool {
        self.input_open.load(Ordering::Acquire) || self.output_open.load(Ordering::Acquire)
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "endpoint closed")
}

/// Set SO_RCVBUF / SO_SNDBUF. Error diabaikan; tidak semua platform
/// mengizinkan.
#[cfg(unix)]
fn configure_socket_buffers(socket: &UdpSocket, size: usize) {
    use std::os::unix::io::AsRawFd;

    let fd = socket.as_raw_fd();
    let optval = size.min(libc::c_int::MAX as usize) as libc::c_int;
    for opt in [libc::SO_RCVBUF, libc::SO_SNDBUF] {
        // SAFETY: fd valid selama socket hidup, optval di stack
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            tracing::debug!(opt, size, "setsockopt failed, keeping kernel default");
        }
    }
}

#[cfg(not(unix))]
fn configure_socket_buffers(_socket: &UdpSocket, _size: usize) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn loopback() -> UdpEndPoint {
        UdpEndPoint::bind("127.0.0.1:0".parse().unwrap(), 64 * 1024).unwrap()
    }

    #[test]
    fn test_fill_empty_socket() {
        let endpoint = loopback();
        let mut buf = BytesMut::with_capacity(1500);
        assert_eq!(endpoint.fill(&mut buf).unwrap(), Fill::Empty);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fill_after_close() {
        let endpoint = loopback();
        endpoint.close();
        let mut buf = BytesMut::with_capacity(1500);
        assert_eq!(endpoint.fill(&mut buf).unwrap(), Fill::Closed);
        assert!(!endpoint.is_open());
    }

    #[test]
    fn test_write_after_shutdown_output_fails() {
        let endpoint = loopback();
        endpoint.shutdown_output();

        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        endpoint.write(
            endpoint.local_addr(),
            vec![Bytes::from_static(b"x")],
            Box::new(move |r: io::Result<()>| *slot.lock() = Some(r.map_err(|e| e.kind()))),
        );
        assert_eq!(*result.lock(), Some(Err(io::ErrorKind::BrokenPipe)));
    }

    #[test]
    fn test_gather_concatenates_buffers() {
        let datagram = UdpEndPoint::gather(vec![
            Bytes::from_static(b"hello "),
            Bytes::from_static(b"world"),
        ]);
        assert_eq!(&datagram[..], b"hello world");
    }

    type Outcome = Arc<Mutex<Option<Result<(), io::ErrorKind>>>>;

    /// Simulasikan write yang kena WouldBlock
    fn park(endpoint: &UdpEndPoint, to: SocketAddr, payload: &'static [u8]) -> Outcome {
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        *endpoint.parked.lock() = Some(ParkedWrite {
            to,
            datagram: Bytes::from_static(payload),
            completion: Box::new(move |r: io::Result<()>| {
                *slot.lock() = Some(r.map_err(|e| e.kind()))
            }),
        });
        result
    }

    #[test]
    fn test_on_writable_sends_parked_write() {
        let endpoint = loopback();
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();

        let result = park(&endpoint, receiver.local_addr().unwrap(), b"parked");
        endpoint.on_writable();

        assert!(!endpoint.has_parked_write());
        assert_eq!(*result.lock(), Some(Ok(())));
        let mut buf = [0u8; 64];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"parked");
    }

    #[test]
    fn test_on_writable_after_shutdown_fails_parked_write() {
        let endpoint = loopback();
        let result = park(&endpoint, endpoint.local_addr(), b"late");
        endpoint.shutdown_output();

        endpoint.on_writable();

        assert!(!endpoint.has_parked_write());
        assert_eq!(*result.lock(), Some(Err(io::ErrorKind::NotConnected)));
    }

    #[test]
    fn test_close_fails_parked_write() {
        let endpoint = loopback();
        let result = park(&endpoint, endpoint.local_addr(), b"late");

        endpoint.close();

        assert!(!endpoint.has_parked_write());
        assert_eq!(*result.lock(), Some(Err(io::ErrorKind::NotConnected)));
        // on_writable setelah close tidak menemukan apa pun
        endpoint.on_writable();
    }

    #[test]
    fn test_fill_interest_is_consumed() {
        let endpoint = loopback();
        assert!(endpoint.take_fill_interest());
        assert!(!endpoint.take_fill_interest());
        endpoint.fill_interested();
        assert!(endpoint.take_fill_interest());
    }
}
