//! Network Layer: Datagram Demultiplexing
//!
//! Menggunakan mio untuk non-blocking UDP I/O.
//!
//! Fitur:
//! - Satu socket UDP dipakai bersama oleh banyak session
//! - Routing datagram berdasarkan connection ID
//! - Write single-flight dengan urutan FIFO

mod connection;
mod endpoint;
mod flusher;
mod registry;
mod server;
mod session;
mod udp;

pub use connection::DatagramConnection;
pub use endpoint::{DatagramEndPoint, Fill, WriteCompletion};
pub use flusher::{DatagramWriter, Flusher, FlusherState, WriteCallback, WriteEntry};
pub use registry::SessionRegistry;
pub use server::MuxServer;
pub use session::{Session, SessionFactory};
pub use udp::UdpEndPoint;
