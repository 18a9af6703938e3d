//! Listener lifecycle and graceful shutdown.
//!
//! Every listener moves through
//!
//! ```text
//! Starting ──► Serving ──► ShuttingDown ──► Stopped
//! ```
//!
//! One [`ShutdownSignal`] is shared by all listeners of a process. When it
//! fires, each listener stops accepting, asks its open connections to finish
//! their in-flight requests and waits for them up to the shutdown timeout.
//! Connections still open after that are dropped. [`Coordinator::wait`]
//! returns once every listener is `Stopped`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::body;
use crate::error::Error;
use crate::request::Request;
use crate::router::Router;

// ── ShutdownSignal ────────────────────────────────────────────────────────────

/// A one-shot, cloneable trigger. All clones observe the same trigger.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self { tx: Arc::new(watch::Sender::new(false)) }
    }

    /// Fires the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn recv(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on the first SIGINT, SIGHUP or SIGTERM (Ctrl-C elsewhere).
pub async fn wait_for_os_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let install = |kind: SignalKind, name: &'static str| {
            signal(kind).map_err(|source| Error::Signal { signal: name, source })
        };
        let mut interrupt = install(SignalKind::interrupt(), "SIGINT")?;
        let mut hangup = install(SignalKind::hangup(), "SIGHUP")?;
        let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;

        let received = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => "SIGHUP",
            _ = terminate.recv() => "SIGTERM",
        };
        info!(signal = received, "shutdown signal received");
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|source| Error::Signal { signal: "Ctrl-C", source })?;
        info!("shutdown signal received");
    }

    Ok(())
}

// ── Listener state ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Read side of one listener's lifecycle.
#[derive(Clone, Debug)]
pub struct ListenerHandle {
    name: &'static str,
    addr: SocketAddr,
    state: watch::Receiver<ListenerState>,
}

impl ListenerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Resolves once the listener reaches `state` or any later one.
    pub async fn reached(&mut self, state: ListenerState) {
        let order = |s: &ListenerState| *s as u8;
        let _ = self.state.wait_for(|current| order(current) >= order(&state)).await;
    }
}

// ── Coordinator ───────────────────────────────────────────────────────────────

/// Owns every listener of a server and the barrier they all stop behind.
pub struct Coordinator {
    signal: ShutdownSignal,
    timeout: Duration,
    listeners: Vec<ListenerHandle>,
    tasks: JoinSet<()>,
}

impl Coordinator {
    pub fn new(timeout: Duration) -> Self {
        Self::with_signal(ShutdownSignal::new(), timeout)
    }

    pub fn with_signal(signal: ShutdownSignal, timeout: Duration) -> Self {
        Self { signal, timeout, listeners: Vec::new(), tasks: JoinSet::new() }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Binds `addr` and starts serving `router` on it. Returns the bound
    /// address, which differs from `addr` when binding port 0.
    pub async fn bind(&mut self, name: &'static str, addr: SocketAddr, router: Arc<Router>) -> Result<SocketAddr, Error> {
        let (state_tx, state_rx) = watch::channel(ListenerState::Starting);
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(|source| Error::Bind { addr, source })?;

        self.listeners.push(ListenerHandle { name, addr: local_addr, state: state_rx });
        let serving = Serving { name, router, signal: self.signal.clone(), timeout: self.timeout, state: state_tx };
        self.tasks.spawn(serving.run(listener));
        Ok(local_addr)
    }

    pub fn listeners(&self) -> &[ListenerHandle] {
        &self.listeners
    }

    /// Waits until every listener is `Stopped`.
    pub async fn wait(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "listener task failed");
            }
        }
    }
}

struct Serving {
    name: &'static str,
    router: Arc<Router>,
    signal: ShutdownSignal,
    timeout: Duration,
    state: watch::Sender<ListenerState>,
}

impl Serving {
    async fn run(self, listener: TcpListener) {
        let name = self.name;
        self.state.send_replace(ListenerState::Serving);
        info!(listener = name, addr = ?listener.local_addr().ok(), "serving");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                biased;

                () = self.signal.recv() => break,

                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(listener = name, error = %e, "accept error");
                            continue;
                        }
                    };
                    connections.spawn(connection(stream, remote, Arc::clone(&self.router), self.signal.clone()));
                }

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        self.state.send_replace(ListenerState::ShuttingDown);
        info!(listener = name, in_flight = connections.len(), "shutting down");

        let drained = tokio::time::timeout(self.timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                listener = name,
                dropped = connections.len(),
                timeout = ?self.timeout,
                "shutdown timeout exceeded, dropping connections"
            );
            connections.shutdown().await;
        }

        self.state.send_replace(ListenerState::Stopped);
        info!(listener = name, "stopped");
    }
}

async fn connection(stream: tokio::net::TcpStream, remote: SocketAddr, router: Arc<Router>, signal: ShutdownSignal) {
    let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let router = Arc::clone(&router);
        async move {
            let (parts, incoming) = req.into_parts();
            let req = Request::new(http::Request::from_parts(parts, body::boxed(incoming)), remote);
            Ok::<_, std::convert::Infallible>(router.route(req).await.into_inner())
        }
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = signal.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!(%remote, error = %e, "connection error");
    }
}
