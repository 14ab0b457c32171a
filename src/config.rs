use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use anyhow::{bail, Context};
use tokio::runtime::{Builder, Runtime};

pub const DEFAULT_PACKETS_PER_GROUP: usize = 512;
pub const DEFAULT_HEADER_SIZE: usize = 12;
pub const DEFAULT_PAYLOAD_SIZE: usize = 4096;

/// The way a group of packets is flushed to a connection
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SendStrategy {
    /// a single vectored write over all header and payload buffers, resubmitting the unwritten
    ///  tail after a partial write
    Vectored,
    /// copy all buffers into one contiguous buffer, then write that
    Coalesced,
    /// a separate write for each header and payload buffer
    OneByOne,
}

impl SendStrategy {
    /// Maps the server's command line flags to a strategy. `write_one_by_one` is ignored for
    ///  vectored writes.
    pub fn from_flags(use_vectored: bool, write_one_by_one: bool) -> SendStrategy {
        match (use_vectored, write_one_by_one) {
            (true, _) => SendStrategy::Vectored,
            (false, true) => SendStrategy::OneByOne,
            (false, false) => SendStrategy::Coalesced,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub listen_addr: SocketAddr,
    pub strategy: SendStrategy,

    /// number of (header, payload) pairs that are sent as a group
    pub packets_per_group: usize,
    pub header_size: usize,
    pub payload_size: usize,

    /// Number of runtime worker threads. `1` builds a current-thread runtime, which keeps all
    ///  accept and send work on a single core - that is the configuration the benchmark numbers
    ///  are meant to be compared for.
    pub worker_threads: usize,

    /// Set SO_LINGER to zero on accepted connections, i.e. reset instead of a regular FIN
    ///  handshake when they are closed
    pub linger_zero: bool,

    /// If false, no signal handlers are installed. The server then runs until it is killed,
    ///  and connections end only on send errors.
    pub handle_signals: bool,
}

impl StreamConfig {
    pub fn new(listen_addr: SocketAddr, strategy: SendStrategy) -> StreamConfig {
        StreamConfig {
            listen_addr,
            strategy,
            packets_per_group: DEFAULT_PACKETS_PER_GROUP,
            header_size: DEFAULT_HEADER_SIZE,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            worker_threads: 1,
            linger_zero: true,
            handle_signals: true,
        }
    }

    /// convenience for listening on all IPV4 interfaces
    pub fn for_port(port: u16, strategy: SendStrategy) -> StreamConfig {
        Self::new(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)), strategy)
    }

    pub fn packet_len(&self) -> usize {
        self.header_size + self.payload_size
    }

    /// The number of bytes in a group, which is also the capacity of the buffer that the
    ///  coalescing strategy copies a group into.
    ///
    /// NB: [StreamConfig::validate] ensures that this does not overflow
    pub fn coalesced_buffer_len(&self) -> usize {
        self.packets_per_group * self.packet_len()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.packets_per_group == 0 {
            bail!("a group must contain at least one packet");
        }
        if self.header_size.checked_add(self.payload_size).unwrap_or(0) == 0 {
            bail!("header size and payload size must not both be zero, and their sum must not overflow");
        }
        if self.packets_per_group.checked_mul(self.packet_len()).is_none() {
            bail!("group size {} x ({} + {}) overflows", self.packets_per_group, self.header_size, self.payload_size);
        }
        if self.worker_threads == 0 {
            bail!("at least one worker thread is required");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub read_buffer_size: usize,
    pub handle_signals: bool,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> ClientConfig {
        ClientConfig {
            server_addr,
            read_buffer_size: 65535,
            handle_signals: true,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.read_buffer_size == 0 {
            bail!("read buffer size must not be zero");
        }
        Ok(())
    }
}

/// Builds the runtime that the benchmark runs on - a current-thread runtime for a single worker,
///  a multi-threaded runtime with exactly `worker_threads` workers otherwise.
pub fn build_runtime(worker_threads: usize) -> anyhow::Result<Runtime> {
    let runtime = if worker_threads <= 1 {
        Builder::new_current_thread()
            .enable_all()
            .build()
    }
    else {
        Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()
    };
    runtime.context("failed to build runtime")
}
