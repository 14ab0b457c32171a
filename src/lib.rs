//! A synthetic TCP streaming-send benchmark.
//!
//! The server emits an unbounded stream of fixed-layout "video packets" to each connected client
//!  as fast as possible. Packets are sent in *groups* of N (header, payload) pairs to amortize
//!  system call overhead, and the way a group is flushed to the socket is configurable:
//!
//! * **vectored** - a single vectored write over all 2N buffers
//! * **coalesced** - copy all buffers into one contiguous buffer, then write it
//! * **one by one** - a separate write for every header and payload buffer
//!
//! Comparing throughput of the three strategies is the whole point of the exercise - there is no
//!  protocol on the wire, just `N * (header_size + payload_size)` bytes per group.
//!
//! Connections are served one at a time, and the runtime defaults to a single thread, so that
//!  the cost of the I/O path on one core is what gets measured.
//!
//! ## Shutdown
//!
//! SIGINT, SIGQUIT and SIGTERM (for the client: SIGHUP, SIGTERM and SIGINT) increment a shared
//!  counter in a [shutdown::ShutdownToken]. The connection loop polls the token between groups,
//!  and a dedicated task closes the listener on the first signal so that a pending `accept()` returns with [listener::ListenerClosed].

pub mod client;
pub mod config;
pub mod connection;
pub mod group_sender;
pub mod listener;
pub mod packet_group;
pub mod server;
pub mod shutdown;
pub mod sink;

#[cfg(test)]
pub mod test_util;
