//! Socket-backed transport.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Transport;

/// Read chunk size; inbound frames are tiny, this leaves headroom for
/// coalesced notifications.
const READ_BUF_SIZE: usize = 256;

/// Transport over a TCP connection to a device bridge.
///
/// Connects lazily in [`Transport::open`], so a session can be constructed
/// before the bridge is reachable.
#[derive(Debug)]
pub struct TcpTransport {
    addr: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Transport targeting `addr` (`host:port`), not yet connected.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: None,
        }
    }

    /// Target address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn stream_mut(&mut self) -> std::io::Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "transport not open")
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> std::io::Result<()> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    async fn read(&mut self) -> std::io::Result<Vec<u8>> {
        let stream = self.stream_mut()?;
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection",
            ));
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn close(&mut self) -> std::io::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
