use std::io;
use std::io::IoSlice;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// This is the abstraction of a connection that groups of packets are written to, introduced to
///  keep the send strategies independent of actual sockets and to facilitate tracking write calls
///  for testing.
///
/// Each method corresponds to (at most) one system call on a socket, i.e. implementations must
///  not retry short writes - that is the caller's responsibility.
#[async_trait]
pub trait PacketSink: Send {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    async fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize>;

    /// Closes the sink's write side. Closing a sink that was closed before must not fail.
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl <W: AsyncWrite + Unpin + Send> PacketSink for W {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        AsyncWriteExt::write(self, buf).await
    }

    async fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        AsyncWriteExt::write_vectored(self, bufs).await
    }

    async fn close(&mut self) -> io::Result<()> {
        match AsyncWriteExt::shutdown(self).await {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            x => x,
        }
    }
}
