//! In-memory transport for tests and loopback wiring.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::Transport;

/// Transport backed by one half of a `tokio::io::duplex` pair.
///
/// The other half plays the device: read what the session writes, feed
/// response bytes back.
#[derive(Debug)]
pub struct DuplexTransport {
    stream: DuplexStream,
}

impl DuplexTransport {
    /// Build a transport plus the peer half that acts as the device.
    pub fn pair(capacity: usize) -> (Self, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(capacity);
        (Self { stream: ours }, theirs)
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn open(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await
    }

    async fn read(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; 256];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the duplex stream",
            ));
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.stream.shutdown().await
    }
}
