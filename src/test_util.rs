//! Helpers for testing send strategies and connection loops without sockets

use std::io;
use std::io::IoSlice;
use async_trait::async_trait;
use bytes::Bytes;
use crate::packet_group::PacketGroup;
use crate::shutdown::ShutdownToken;
use crate::sink::PacketSink;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WriteCall {
    Write { requested: usize, written: usize },
    Vectored { slice_lens: Vec<usize>, written: usize },
}
impl WriteCall {
    pub fn written(&self) -> usize {
        match self {
            WriteCall::Write { written, .. } => *written,
            WriteCall::Vectored { written, .. } => *written,
        }
    }
}

/// A [PacketSink] that keeps track of all write calls and the data written.
pub struct RecordingSink {
    /// simulates short writes: each call writes at most this many bytes
    pub max_per_call: Option<usize>,
    /// calls after the first n fail with `BrokenPipe` (and are not recorded)
    pub fail_after_calls: Option<usize>,
    /// requests shutdown from inside the n-th call (zero based), simulating a signal that
    ///  arrives while a send is in progress
    pub shutdown_during_call: Option<(usize, ShutdownToken)>,

    pub calls: Vec<WriteCall>,
    pub data: Vec<u8>,
    pub num_close_calls: usize,
}

impl RecordingSink {
    pub fn new(max_per_call: Option<usize>) -> RecordingSink {
        RecordingSink {
            max_per_call,
            fail_after_calls: None,
            shutdown_during_call: None,
            calls: Vec::new(),
            data: Vec::new(),
            num_close_calls: 0,
        }
    }

    fn before_call(&mut self) -> io::Result<usize> {
        if let Some((n, token)) = &self.shutdown_during_call {
            if *n == self.calls.len() {
                token.request();
            }
        }

        if let Some(n) = self.fail_after_calls {
            if self.calls.len() >= n {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
        }
        Ok(self.max_per_call.unwrap_or(usize::MAX))
    }
}

#[async_trait]
impl PacketSink for RecordingSink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let max = self.before_call()?;
        let written = buf.len().min(max);
        self.data.extend_from_slice(&buf[..written]);
        self.calls.push(WriteCall::Write { requested: buf.len(), written });
        Ok(written)
    }

    async fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let mut remaining = self.before_call()?;
        let mut written = 0;
        for b in bufs {
            let n = b.len().min(remaining);
            self.data.extend_from_slice(&b[..n]);
            written += n;
            remaining -= n;
            if remaining == 0 {
                break;
            }
        }
        self.calls.push(WriteCall::Vectored { slice_lens: bufs.iter().map(|b| b.len()).collect(), written });
        Ok(written)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.num_close_calls += 1;
        Ok(())
    }
}

/// creates a group with recognizable content: header and payload bytes are distinct counting
///  sequences
pub fn patterned_group(num_packets: usize, header_size: usize, payload_size: usize) -> PacketGroup {
    let header = (0..header_size).map(|i| 0x80 | (i as u8 & 0x7f)).collect::<Vec<_>>();
    let payload = (0..payload_size).map(|i| i as u8 & 0x7f).collect::<Vec<_>>();
    PacketGroup::from_parts(Bytes::from(header), Bytes::from(payload), num_packets)
}
