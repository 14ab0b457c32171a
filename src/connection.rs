use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};
use crate::config::StreamConfig;
use crate::group_sender::GroupSender;
use crate::packet_group::PacketGroup;
use crate::shutdown::ShutdownToken;
use crate::sink::PacketSink;

#[derive(Debug)]
pub enum StopReason {
    /// shutdown was requested, observed between two groups
    Shutdown,
    /// sending a group failed - the connection's state is unknown afterwards
    SendFailed(std::io::Error),
}

impl Display for StopReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Shutdown => write!(f, "shutdown requested"),
            StopReason::SendFailed(e) => write!(f, "send failed: {}", e),
        }
    }
}

/// What happened on a connection, from the time it was accepted until it was closed
#[derive(Debug)]
pub struct ConnectionSummary {
    pub groups_sent: u64,
    /// bytes handed to the socket by completed sends. This is not what the peer received: with
    ///  zero linger, data still queued in the kernel when the connection closes is discarded.
    pub bytes_sent: u64,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

impl ConnectionSummary {
    /// throughput in MiB per second, or 0 if no time elapsed
    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_sent as f64 / (1024.0 * 1024.0) / secs
        }
        else {
            0.0
        }
    }
}

/// Applies the benchmark's socket options to an accepted connection: Nagle's algorithm stays
///  enabled (we favor batching over latency), and optionally SO_LINGER is set to zero.
pub fn configure_stream(stream: &TcpStream, config: &StreamConfig) -> anyhow::Result<()> {
    stream.set_nodelay(false)?;
    if config.linger_zero {
        socket2::SockRef::from(stream).set_linger(Some(Duration::ZERO))?;
    }
    Ok(())
}

/// Serves an accepted connection until shutdown is requested or a send fails. The connection is
///  closed and dropped before this function returns.
pub async fn run_connection<S: PacketSink>(mut sink: S, config: &StreamConfig, shutdown: &ShutdownToken) -> ConnectionSummary {
    let summary = stream_groups(&mut sink, config, shutdown).await;
    drop(sink);
    summary
}

/// Sends packet groups to a sink until shutdown is requested or a send fails, then closes
///  the sink.
///
/// The connection loop has two states while it is running:
///  * RUNNING: check the shutdown token; if shutdown was not requested, send one group
///  * STOPPING: reached on shutdown or on a send error - the sink is closed (the only place
///     where this happens), and the loop is done
///
/// Shutdown is checked between groups only: a group that is being sent when shutdown is
///  requested is sent to completion (or failure) first.
pub async fn stream_groups<S: PacketSink + ?Sized>(sink: &mut S, config: &StreamConfig, shutdown: &ShutdownToken) -> ConnectionSummary {
    let group = PacketGroup::new(config.packets_per_group, config.header_size, config.payload_size);
    let mut sender = GroupSender::for_config(config);
    debug!("serving connection with strategy {:?}, {} packets per group, {} bytes per group", sender.strategy(), group.num_packets(), group.total_len());

    let started = Instant::now();
    let mut groups_sent = 0u64;
    let mut bytes_sent = 0u64;

    let stop_reason = loop {
        if shutdown.is_requested() {
            debug!("connection loop exits for shutdown request #{}", shutdown.signal_count());
            break StopReason::Shutdown;
        }

        match sender.send_group(sink, &group).await {
            Ok(n) => {
                groups_sent += 1;
                bytes_sent += n as u64;
                trace!("sent group #{}", groups_sent);
            }
            Err(e) => {
                break StopReason::SendFailed(e);
            }
        }
    };

    if let Err(e) = sink.close().await {
        debug!("error closing connection: {}", e);
    }

    ConnectionSummary {
        groups_sent,
        bytes_sent,
        elapsed: started.elapsed(),
        stop_reason,
    }
}

/// logs a connection's summary when it is done
pub fn log_summary(summary: &ConnectionSummary) {
    match &summary.stop_reason {
        StopReason::Shutdown => info!(
            "connection closed ({}): {} groups, {} bytes in {:.2?} - {:.2} MiB/s",
            summary.stop_reason, summary.groups_sent, summary.bytes_sent, summary.elapsed, summary.mib_per_sec()),
        StopReason::SendFailed(_) => warn!(
            "connection closed ({}): {} groups, {} bytes in {:.2?} - {:.2} MiB/s",
            summary.stop_reason, summary.groups_sent, summary.bytes_sent, summary.elapsed, summary.mib_per_sec()),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use rstest::rstest;
    use tokio::io::AsyncReadExt;
    use crate::config::SendStrategy;
    use crate::test_util::{RecordingSink, WriteCall};
    use super::*;

    fn small_config(strategy: SendStrategy) -> StreamConfig {
        let mut config = StreamConfig::for_port(0, strategy);
        config.packets_per_group = 4;
        config.header_size = 3;
        config.payload_size = 10;
        config
    }

    #[tokio::test]
    async fn test_no_send_after_shutdown() {
        let config = small_config(SendStrategy::Coalesced);
        let shutdown = ShutdownToken::new();
        shutdown.request();

        let mut sink = RecordingSink::new(None);
        let summary = stream_groups(&mut sink, &config, &shutdown).await;

        assert!(matches!(summary.stop_reason, StopReason::Shutdown));
        assert_eq!(summary.groups_sent, 0);
        assert!(sink.calls.is_empty());
        assert_eq!(sink.num_close_calls, 1);
    }

    #[rstest]
    #[case::vectored(SendStrategy::Vectored)]
    #[case::coalesced(SendStrategy::Coalesced)]
    #[case::one_by_one(SendStrategy::OneByOne)]
    fn test_send_error_closes_connection(#[case] strategy: SendStrategy) {
        tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
            let config = small_config(strategy);
            let shutdown = ShutdownToken::new();

            let mut sink = RecordingSink::new(None);
            sink.fail_after_calls = Some(20);
            let summary = stream_groups(&mut sink, &config, &shutdown).await;

            match &summary.stop_reason {
                StopReason::SendFailed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
                other => panic!("unexpected stop reason {:?}", other),
            }
            assert_eq!(sink.num_close_calls, 1);
            assert_eq!(summary.bytes_sent, summary.groups_sent * 52);
            // bytes of the failed group that the socket accepted are not counted
            assert!(sink.data.len() as u64 >= summary.bytes_sent);
            assert!(!shutdown.is_requested());
        });
    }

    #[tokio::test]
    async fn test_shutdown_during_send() {
        let config = small_config(SendStrategy::OneByOne);
        let shutdown = ShutdownToken::new();

        let mut sink = RecordingSink::new(None);
        // the 3rd of 8 writes of the second group
        sink.shutdown_during_call = Some((10, shutdown.clone()));
        let summary = stream_groups(&mut sink, &config, &shutdown).await;

        assert!(matches!(summary.stop_reason, StopReason::Shutdown));
        assert_eq!(summary.groups_sent, 2);
        assert_eq!(summary.bytes_sent, 104);
        assert_eq!(sink.calls.len(), 16);
        assert!(sink.calls.iter().all(|c| matches!(c, WriteCall::Write { .. })));
        assert_eq!(sink.num_close_calls, 1);
    }

    #[tokio::test]
    async fn test_stream_over_duplex() {
        let config = small_config(SendStrategy::Vectored);
        let shutdown = ShutdownToken::new();
        let (mut client, server) = tokio::io::duplex(1000);

        let connection = tokio::spawn({
            let config = config.clone();
            let shutdown = shutdown.clone();
            async move { run_connection(server, &config, &shutdown).await }
        });

        let mut buf = vec![0u8; 52 * 10];
        client.read_exact(&mut buf).await.unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        shutdown.request();
        // drain until the server closes its end
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();

        let summary = connection.await.unwrap();
        assert!(matches!(summary.stop_reason, StopReason::Shutdown));
        assert_eq!(summary.bytes_sent, summary.groups_sent * 52);
        assert_eq!(summary.bytes_sent as usize, buf.len() + rest.len());
    }

    #[tokio::test]
    async fn test_peer_disconnect_is_send_failure() {
        let config = small_config(SendStrategy::Coalesced);
        let shutdown = ShutdownToken::new();
        let (client, server) = tokio::io::duplex(100);
        drop(client);

        let summary = run_connection(server, &config, &shutdown).await;

        assert!(matches!(summary.stop_reason, StopReason::SendFailed(_)));
        assert_eq!(summary.groups_sent, 0);
    }

    #[rstest]
    #[case(0, 1_000, 0.0)]
    #[case(1024 * 1024, 1_000, 1.0)]
    #[case(10 * 1024 * 1024, 500, 20.0)]
    #[case(5, 0, 0.0)]
    fn test_mib_per_sec(#[case] bytes_sent: u64, #[case] millis: u64, #[case] expected: f64) {
        let summary = ConnectionSummary {
            groups_sent: 1,
            bytes_sent,
            elapsed: Duration::from_millis(millis),
            stop_reason: StopReason::Shutdown,
        };
        assert!((summary.mib_per_sec() - expected).abs() < 1e-9);
    }
}
