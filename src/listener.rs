use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info};

/// The error returned by [PacketListener::accept] after the listener was closed. This is the
///  regular way of unblocking a pending `accept()` on shutdown, so callers should treat it as
///  cancellation rather than a failure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ListenerClosed;

impl Display for ListenerClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener was closed")
    }
}

impl std::error::Error for ListenerClosed {}

/// A TCP listener that can be closed from a different task than the one calling `accept()`.
///
/// Closing is done through a [ListenerCloser]: any pending `accept()` returns [ListenerClosed],
///  the socket is released, and all subsequent calls to `accept()` fail with [ListenerClosed].
pub struct PacketListener {
    socket: Option<TcpListener>,
    local_addr: SocketAddr,
    closed: watch::Receiver<bool>,
    closer: ListenerCloser,
}

impl PacketListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<PacketListener> {
        let socket = TcpListener::bind(addr).await
            .with_context(|| format!("failed to listen on {}", addr))?;
        let local_addr = socket.local_addr()?;
        info!("listening at tcp://{}", local_addr);

        let (tx, closed) = watch::channel(false);
        Ok(PacketListener {
            socket: Some(socket),
            local_addr,
            closed,
            closer: ListenerCloser { closed: Arc::new(tx) },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// returns a handle that can close this listener from a different task
    pub fn closer(&self) -> ListenerCloser {
        self.closer.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none() || *self.closed.borrow()
    }

    pub async fn accept(&mut self) -> anyhow::Result<(TcpStream, SocketAddr)> {
        if *self.closed.borrow() {
            self.release_socket();
        }
        let socket = match &self.socket {
            Some(s) => s,
            None => return Err(ListenerClosed.into()),
        };

        let result = tokio::select! {
            biased;
            true = wait_closed(&mut self.closed) => None,
            r = socket.accept() => Some(r),
        };

        match result {
            Some(r) => Ok(r?),
            None => {
                self.release_socket();
                Err(ListenerClosed.into())
            }
        }
    }

    fn release_socket(&mut self) {
        if self.socket.take().is_some() {
            debug!("released listening socket {}", self.local_addr);
        }
    }
}

/// resolves to `true` once the listener is closed, or to `false` if it can no longer be closed
async fn wait_closed(closed: &mut watch::Receiver<bool>) -> bool {
    closed.wait_for(|&c| c).await.is_ok()
}

/// Closes a [PacketListener]. Closing is idempotent.
#[derive(Clone, Debug)]
pub struct ListenerCloser {
    closed: Arc<watch::Sender<bool>>,
}

impl ListenerCloser {
    /// Closes the listener, returning `true` if this call closed it and `false` if it was
    ///  closed before
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            }
            else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
