use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};
use crate::config::StreamConfig;
use crate::connection::{configure_stream, log_summary, run_connection, ConnectionSummary};
use crate::listener::PacketListener;
use crate::shutdown::{spawn_listener_closer, ShutdownToken, SignalListener, SERVER_SIGNALS};

/// Binds the configured address and streams packets to connecting clients, one connection at a
///  time, until shutdown.
///
/// If the config says so, signal handlers are installed after the socket is bound. They request
///  shutdown on the provided token, and the tasks counting them stop when this function returns.
pub async fn serve(config: StreamConfig, shutdown: ShutdownToken) -> anyhow::Result<()> {
    config.validate()?;

    let listener = PacketListener::bind(config.listen_addr).await?;

    let _signals = if config.handle_signals {
        Some(SignalListener::spawn(&shutdown, &SERVER_SIGNALS)?)
    }
    else {
        warn!("not handling signals - the server runs until it is killed");
        None
    };

    run_listener(listener, &config, &shutdown).await
}

/// The accept loop: accepts a connection and serves it to completion before accepting the
///  next one.
///
/// Returns `Ok` after shutdown: either shutdown was observed between connections, or the
///  listener was closed to unblock a pending `accept()`. An accept error without shutdown
///  having been requested is returned as an error.
pub async fn run_listener(mut listener: PacketListener, config: &StreamConfig, shutdown: &ShutdownToken) -> anyhow::Result<()> {
    let closer_task = spawn_listener_closer(shutdown.clone(), listener.closer());

    info!("streaming to tcp://{} with strategy {:?}", listener.local_addr(), config.strategy);

    let result = loop {
        if shutdown.is_requested() {
            info!("listener exits for shutdown");
            break Ok(());
        }

        let (stream, peer_addr) = match listener.accept().await {
            Ok(x) => x,
            Err(e) => {
                if shutdown.is_requested() {
                    info!("listener exits: {}", e);
                    break Ok(());
                }
                break Err(e);
            }
        };

        if let Some(summary) = handle_connection(stream, peer_addr, config, shutdown).await {
            log_summary(&summary);
        }
    };

    closer_task.abort();
    result
}

#[instrument(name="accepted_connection", skip_all, fields(addr = %peer_addr))]
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, config: &StreamConfig, shutdown: &ShutdownToken) -> Option<ConnectionSummary> {
    debug!("accepted connection");

    if let Err(e) = configure_stream(&stream, config) {
        warn!("failed to configure socket, dropping connection: {}", e);
        return None;
    }

    Some(run_connection(stream, config, shutdown).await)
}
