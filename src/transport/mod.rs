//! Abstract byte transport and its concrete implementations.
//!
//! The session loop is transport-agnostic: anything that can write a command
//! frame and surface inbound notification bytes works. Shipped here:
//!
//! - [`TcpTransport`]: socket-backed, for device bridges exposing the wire
//!   protocol over TCP.
//! - [`DuplexTransport`]: in-memory pair, for tests and loopback setups.
//!
//! A BLE-backed implementation belongs to whatever platform layer owns the
//! GATT stack; it only needs to implement [`Transport`].

mod duplex;
mod tcp;

use async_trait::async_trait;

pub use duplex::DuplexTransport;
pub use tcp::TcpTransport;

/// Fallible byte transport to the device.
///
/// `read` must be cancel-safe: the session polls it inside a `select!` and
/// may drop the future between chunks. All methods take `&mut self`; the
/// session owns the transport outright and never shares it.
#[async_trait]
pub trait Transport: Send {
    /// Establish the connection. Called once before the first write.
    async fn open(&mut self) -> std::io::Result<()>;

    /// Write one complete frame.
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Wait for the next chunk of inbound bytes.
    ///
    /// Chunks carry no framing guarantees; the caller reassembles frames.
    /// An empty-stream end is reported as an error, never as `Ok(vec![])`.
    async fn read(&mut self) -> std::io::Result<Vec<u8>>;

    /// Tear the connection down.
    async fn close(&mut self) -> std::io::Result<()>;
}
