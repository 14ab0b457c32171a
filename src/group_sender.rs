use std::io;
use std::io::IoSlice;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;
use crate::config::{SendStrategy, StreamConfig};
use crate::packet_group::PacketGroup;
use crate::sink::PacketSink;

/// Upper bound for the number of slices passed to a single vectored write. Linux rejects
///  `writev` calls with more than IOV_MAX (1024) slices, so bigger groups are submitted in
///  chunks.
pub const MAX_IO_SLICES: usize = 1024;

/// Flushes packet groups to a connection with a fixed [SendStrategy].
///
/// A sender belongs to a single connection: it owns the coalescing buffer (if the strategy
///  uses one), which is allocated once and reused for every group.
pub struct GroupSender {
    strategy: SendStrategy,
    coalesce_buf: BytesMut,
}

impl GroupSender {
    pub fn new(strategy: SendStrategy, coalesced_buffer_len: usize) -> GroupSender {
        let coalesce_buf = match strategy {
            SendStrategy::Coalesced => BytesMut::with_capacity(coalesced_buffer_len),
            _ => BytesMut::new(),
        };

        GroupSender {
            strategy,
            coalesce_buf,
        }
    }

    pub fn for_config(config: &StreamConfig) -> GroupSender {
        Self::new(config.strategy, config.coalesced_buffer_len())
    }

    pub fn strategy(&self) -> SendStrategy {
        self.strategy
    }

    pub fn coalesce_buffer_capacity(&self) -> usize {
        self.coalesce_buf.capacity()
    }

    /// Sends all of the group's bytes, returning the number of bytes written (which is always
    ///  the group's total length).
    ///
    /// NB: There is no recovery from a failed write - the connection's state is unknown
    ///      afterwards, so callers should treat any error as fatal for the connection.
    pub async fn send_group<S: PacketSink + ?Sized>(&mut self, sink: &mut S, group: &PacketGroup) -> io::Result<usize> {
        match self.strategy {
            SendStrategy::Vectored => write_vectored_all(sink, group.buffers()).await,
            SendStrategy::Coalesced => {
                coalesce(&mut self.coalesce_buf, group);
                write_all(sink, &self.coalesce_buf).await
            }
            SendStrategy::OneByOne => write_one_by_one(sink, group).await,
        }
    }
}

/// Copies the group's buffers into `buf`, replacing its previous content. `buf` does not grow
///  if its capacity is at least the group's total length.
fn coalesce(buf: &mut BytesMut, group: &PacketGroup) {
    buf.clear();
    for b in group.iter() {
        buf.put_slice(b);
    }
}

/// Writes `buf` completely, issuing another write for the remainder after a short write
pub async fn write_all<S: PacketSink + ?Sized>(sink: &mut S, buf: &[u8]) -> io::Result<usize> {
    let mut offs = 0;
    while offs < buf.len() {
        let n = sink.write(&buf[offs..]).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        offs += n;
    }
    Ok(offs)
}

async fn write_one_by_one<S: PacketSink + ?Sized>(sink: &mut S, group: &PacketGroup) -> io::Result<usize> {
    let mut total = 0;
    for b in group.iter() {
        total += write_all(sink, b).await?;
    }
    Ok(total)
}

/// Writes all buffers with vectored writes.
///
/// A vectored write may be partial, so after each call the fully written buffers are dropped
///  from the list, and the first remaining buffer is resubmitted starting at the first unwritten
///  byte.
pub async fn write_vectored_all<S: PacketSink + ?Sized>(sink: &mut S, bufs: &[Bytes]) -> io::Result<usize> {
    let mut idx = 0;
    let mut offs = 0;
    let mut total = 0;
    let mut slices = Vec::with_capacity(bufs.len().min(MAX_IO_SLICES));

    loop {
        while idx < bufs.len() && offs == bufs[idx].len() {
            idx += 1;
            offs = 0;
        }
        if idx == bufs.len() {
            return Ok(total);
        }

        slices.clear();
        slices.push(IoSlice::new(&bufs[idx][offs..]));
        slices.extend(bufs[idx+1..].iter()
            .take(MAX_IO_SLICES - 1)
            .map(|b| IoSlice::new(b)));

        let mut n = sink.write_vectored(&slices).await?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        total += n;
        trace!("vectored write of {} slices wrote {} bytes", slices.len(), n);

        while n > 0 {
            let remaining_in_buf = bufs[idx].len() - offs;
            if n < remaining_in_buf {
                offs += n;
                break;
            }
            n -= remaining_in_buf;
            idx += 1;
            offs = 0;
        }
    }
}
