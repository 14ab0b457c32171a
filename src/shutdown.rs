use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use crate::listener::ListenerCloser;

/// A handle to the process' shutdown state, passed to every loop that needs to terminate on
///  shutdown. Clones share the same state.
///
/// The state is a counter of shutdown requests (typically: signals received). It starts at
///  zero, is only ever incremented, and shutdown is requested iff it is non-zero.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    counter: AtomicU64,
    /// mirrors the counter for tasks that wait for shutdown rather than polling
    notify: watch::Sender<u64>,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    pub fn new() -> ShutdownToken {
        let (notify, _) = watch::channel(0);
        ShutdownToken {
            inner: Arc::new(ShutdownInner {
                counter: AtomicU64::new(0),
                notify,
            }),
        }
    }

    /// Requests shutdown, returning the number of requests including this one
    pub fn request(&self) -> u64 {
        let count = self.inner.counter.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.notify.send_modify(|n| *n = (*n).max(count));
        count
    }

    pub fn is_requested(&self) -> bool {
        self.signal_count() > 0
    }

    pub fn signal_count(&self) -> u64 {
        self.inner.counter.load(Ordering::Acquire)
    }

    /// Waits until shutdown is requested, returning immediately if it was requested before
    pub async fn requested(&self) {
        let mut rx = self.inner.notify.subscribe();
        // the sender lives in `self`, so this can not fail
        let _ = rx.wait_for(|&n| n > 0).await;
    }
}

/// A signal that requests shutdown when it is caught
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ShutdownSignal {
    Interrupt,
    Quit,
    Terminate,
    Hangup,
}

impl ShutdownSignal {
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "SIGINT",
            ShutdownSignal::Quit => "SIGQUIT",
            ShutdownSignal::Terminate => "SIGTERM",
            ShutdownSignal::Hangup => "SIGHUP",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;
        match self {
            ShutdownSignal::Interrupt => SignalKind::interrupt(),
            ShutdownSignal::Quit => SignalKind::quit(),
            ShutdownSignal::Terminate => SignalKind::terminate(),
            ShutdownSignal::Hangup => SignalKind::hangup(),
        }
    }
}

/// The signals that shut down the streaming server
pub const SERVER_SIGNALS: [ShutdownSignal; 3] = [ShutdownSignal::Interrupt, ShutdownSignal::Quit, ShutdownSignal::Terminate];

/// The signals that stop the benchmark client. A client started from a terminal stops when
///  the terminal goes away.
pub const CLIENT_SIGNALS: [ShutdownSignal; 3] = [ShutdownSignal::Hangup, ShutdownSignal::Terminate, ShutdownSignal::Interrupt];

/// Tasks counting shutdown signals into a [ShutdownToken]. The tasks keep running and counting
///  after the first signal, and they are aborted when the `SignalListener` is dropped.
#[derive(Debug)]
pub struct SignalListener {
    tasks: Vec<JoinHandle<()>>,
}

impl SignalListener {
    /// Registers handlers for all of `signals` and spawns a counting task per signal.
    ///
    /// All handlers are registered before a task is spawned, so a registration failure leaves
    ///  nothing running. Signals arriving after this function returns are never missed.
    #[cfg(unix)]
    pub fn spawn(token: &ShutdownToken, signals: &[ShutdownSignal]) -> anyhow::Result<SignalListener> {
        use anyhow::Context;

        let mut streams = Vec::with_capacity(signals.len());
        for &sig in signals {
            let stream = tokio::signal::unix::signal(sig.kind())
                .with_context(|| format!("failed to register handler for {}", sig.name()))?;
            streams.push((sig, stream));
        }

        let tasks = streams.into_iter()
            .map(|(sig, mut stream)| {
                let token = token.clone();
                tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        let count = token.request();
                        info!("signal caught: {} - shutdown requested ({} signals so far)", sig.name(), count);
                    }
                })
            })
            .collect();

        Ok(SignalListener { tasks })
    }

    /// Only ctrl-c can be observed outside of unix, so `signals` is ignored
    #[cfg(not(unix))]
    pub fn spawn(token: &ShutdownToken, _signals: &[ShutdownSignal]) -> anyhow::Result<SignalListener> {
        let token = token.clone();
        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl-c: {}", e);
                    return;
                }
                let count = token.request();
                info!("ctrl-c caught - shutdown requested ({} signals so far)", count);
            }
        });
        Ok(SignalListener { tasks: vec![task] })
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Spawns a task that closes the listener when shutdown is requested, unblocking a pending
///  `accept()`. Only the first request has an effect on the listener.
pub fn spawn_listener_closer(token: ShutdownToken, closer: ListenerCloser) -> JoinHandle<()> {
    tokio::spawn(async move {
        token.requested().await;
        if closer.close() {
            info!("listener closed");
        }
        else {
            debug!("listener was closed before");
        }
    })
}
