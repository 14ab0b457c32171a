use std::time::{Duration, Instant};
use anyhow::Context;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tracing::{debug, info};
use crate::config::ClientConfig;
use crate::shutdown::{ShutdownToken, SignalListener, CLIENT_SIGNALS};

/// The result of a client run: how much data was received in how much time
#[derive(Debug, Clone, Copy)]
pub struct ClientReport {
    pub bytes_read: u64,
    pub elapsed: Duration,
}

impl ClientReport {
    /// bandwidth in MiB per second, or 0 if no time elapsed
    pub fn bandwidth_mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_read as f64 / (1024.0 * 1024.0) / secs
        }
        else {
            0.0
        }
    }
}

/// Connects to a streaming server and discards everything it sends until the server closes the
///  connection, a read fails, or shutdown is requested.
pub async fn run_client(config: &ClientConfig, shutdown: ShutdownToken) -> anyhow::Result<ClientReport> {
    config.validate()?;

    let mut stream = TcpStream::connect(config.server_addr).await
        .with_context(|| format!("connect to server at tcp://{} failed", config.server_addr))?;
    info!("server at tcp://{} connected, press <ctrl+c> to exit ...", config.server_addr);

    let _signals = if config.handle_signals {
        Some(SignalListener::spawn(&shutdown, &CLIENT_SIGNALS)?)
    }
    else {
        None
    };

    Ok(drain(&mut stream, config.read_buffer_size, &shutdown).await)
}

/// Reads and discards data into a reused buffer, returning the number of bytes that were read.
///  Read errors end the loop the same way as EOF does - this is a benchmark client, and the
///  server resetting the connection is a regular way for a run to end.
pub async fn drain<R: AsyncRead + Unpin>(reader: &mut R, read_buffer_size: usize, shutdown: &ShutdownToken) -> ClientReport {
    let mut buf = vec![0u8; read_buffer_size];
    let mut bytes_read = 0u64;
    let started = Instant::now();

    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown.requested() => {
                info!("client exit by signal");
                break;
            }
            r = reader.read(&mut buf) => r,
        };

        match result {
            Ok(0) => {
                info!("server closed");
                break;
            }
            Ok(n) => bytes_read += n as u64,
            Err(e) => {
                debug!("read failed: {}", e);
                info!("server closed");
                break;
            }
        }
    }

    let report = ClientReport {
        bytes_read,
        elapsed: started.elapsed(),
    };
    info!("elapsed time is {:.2?}, {} bytes read, bandwidth {:.2} MiB/s", report.elapsed, report.bytes_read, report.bandwidth_mib_per_sec());
    report
}
