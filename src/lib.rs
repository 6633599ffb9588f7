//! quicmux - Datagram Connection Multiplexer
//!
//! Arsitektur:
//! - Satu socket UDP, banyak session (routing via QUIC connection ID)
//! - Read loop non-blocking, tidak pernah menahan worker thread
//! - Write single-flight dengan urutan FIFO global
//! - Buffer baca dipinjam dari pool dan dikembalikan tepat sekali

pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod protocol;

pub use config::MuxConfig;
pub use error::{MuxError, Result};
pub use network::{
    DatagramConnection, DatagramEndPoint, DatagramWriter, Fill, FlusherState, MuxServer, Session,
    SessionFactory, SessionRegistry, UdpEndPoint,
};
pub use protocol::ConnectionId;
