//! Wires a [`Config`] into routes, middleware chains and listeners.
//!
//! Route layout:
//!
//! ```text
//! GET  /status              server header
//! GET  <metrics path>       server header              (main or own listener)
//! GET  <download endpoint>  transfer chain + read lock
//! POST <upload endpoint>    transfer chain + write lock
//! GET  <prefix>/…           transfer chain + read lock  (static files)
//! *    anything else         server header              (404)
//! ```
//!
//! The transfer chain is metrics, request logging, server header, read auth
//! and write auth, outermost first. The locks exist only with
//! `sync_transfers`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use http::Method;
use tracing::{debug, info};

use crate::auth::AuthRule;
use crate::config::Config;
use crate::endpoint::EndpointMapper;
use crate::error::Error;
use crate::handler::Handler;
use crate::metrics::{self, Metrics};
use crate::middleware::{AuthChecker, Chain, MetricsObserver, RequestLogger, ServerHeader, SyncRead, SyncWrite, TreeLock};
use crate::pathguard;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::shutdown::{self, Coordinator, ListenerHandle, ShutdownSignal};
use crate::{files, status, transfer};

/// A configured, not yet listening server.
pub struct Server {
    config: Config,
    doc_root: PathBuf,
    router: Router,
    metrics_router: Option<Router>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let doc_root = pathguard::absolute(&config.doc_root);

        let metrics = if config.metrics_enabled {
            Some(Metrics::new(config.metrics_duration_buckets.clone(), config.metrics_size_buckets.clone())?)
        } else {
            None
        };

        let identity = Chain::new().with(ServerHeader::new(&config.info));
        let transfers = transfer_chain(&config, metrics.as_ref())?;
        let lock = config.sync_transfers.then(TreeLock::default);
        let reading = transfers.clone().with_optional(lock.clone().map(SyncRead));
        let writing = transfers.with_optional(lock.map(SyncWrite));

        let mut router = Router::new().on_boxed(
            Method::GET,
            "/status",
            identity.apply(status::status(config.info.clone())),
        )?;
        if let Some(endpoint) = &config.download_endpoint {
            router = router.on_boxed(Method::GET, endpoint, reading.apply(transfer::download(doc_root.clone())))?;
            info!(%endpoint, "configured downloads");
        }
        if let Some(endpoint) = &config.upload_endpoint {
            let handler = transfer::upload(doc_root.clone(), metrics.clone());
            router = router.on_boxed(Method::POST, endpoint, writing.apply(handler))?;
            info!(%endpoint, "configured uploads");
        }
        router = router.mount(&config.prefix, reading.apply(files::serve_dir(doc_root.clone())));

        let mut metrics_router = None;
        if let Some(metrics) = &metrics {
            let handler = identity.apply(metrics::handler(metrics.clone()));
            if config.metrics_listen_addr.is_some() {
                metrics_router = Some(Router::new().on_boxed(Method::GET, &config.metrics_path, handler)?);
            } else {
                router = router.on_boxed(Method::GET, &config.metrics_path, handler)?;
            }
            info!(path = %config.metrics_path, "configured metrics");
        }

        router = router.fallback(identity.apply(not_found));
        let metrics_router = metrics_router.map(|r| r.fallback(identity.apply(not_found)));
        debug!(reading = ?reading.names(), writing = ?writing.names(), "transfer middlewares");

        Ok(Self { config, doc_root, router, metrics_router })
    }

    /// Binds every listener and starts serving. Nothing reacts to OS signals;
    /// stop the server through [`Running::shutdown_signal`].
    pub async fn start(self) -> Result<Running, Error> {
        self.start_with(ShutdownSignal::new()).await
    }

    pub async fn start_with(self, signal: ShutdownSignal) -> Result<Running, Error> {
        info!(identity = %self.config.info, root = %self.doc_root.display(), "starting");
        let mut coordinator = Coordinator::with_signal(signal, self.config.shutdown_timeout);

        let local_addr = coordinator.bind("main", self.config.listen_addr, Arc::new(self.router)).await?;
        let metrics_addr = match (self.metrics_router, self.config.metrics_listen_addr) {
            (Some(router), Some(addr)) => Some(coordinator.bind("metrics", addr, Arc::new(router)).await?),
            _ => None,
        };

        Ok(Running { coordinator, local_addr, metrics_addr })
    }

    /// Serves until SIGINT, SIGHUP or SIGTERM, then shuts every listener down.
    pub async fn serve(self) -> Result<(), Error> {
        let running = self.start().await?;
        let signal = running.shutdown_signal();
        let watcher = tokio::spawn(async move {
            let result = shutdown::wait_for_os_signal().await;
            signal.trigger();
            result
        });

        running.wait().await;
        info!("server is now shut down");
        match watcher.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }
}

async fn not_found(_: Request) -> Response {
    Response::not_found()
}

fn transfer_chain(config: &Config, metrics: Option<&Metrics>) -> Result<Chain, Error> {
    let observer = metrics.map(|metrics| {
        let mut endpoints = EndpointMapper::new();
        endpoints.declare(&config.prefix, &config.prefix);
        for endpoint in [&config.upload_endpoint, &config.download_endpoint].into_iter().flatten() {
            endpoints.declare(endpoint, endpoint);
        }
        MetricsObserver::new(metrics.clone(), Arc::new(endpoints))
    });

    let realm = &config.info.name;
    let read = match &config.read_authorizations {
        Some(credentials) => {
            info!(users = credentials.len(), "configured read authorizations");
            Some(AuthChecker::new(realm, AuthRule::new(Method::GET, ".*", credentials.clone())?))
        }
        None => None,
    };
    let write = match (&config.write_authorizations, &config.upload_endpoint) {
        (Some(credentials), Some(upload)) => {
            info!(users = credentials.len(), "configured write authorizations");
            let rule = AuthRule::new(Method::POST, &regex::escape(upload), credentials.clone())?;
            Some(AuthChecker::new(realm, rule))
        }
        _ => None,
    };

    Ok(Chain::new()
        .with_optional(observer)
        .with(RequestLogger)
        .with(ServerHeader::new(&config.info))
        .with_optional(read)
        .with_optional(write))
}

/// A server whose listeners are accepting connections.
pub struct Running {
    coordinator: Coordinator,
    local_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
}

impl Running {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the separate metrics listener, when configured.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.coordinator.signal()
    }

    pub fn listeners(&self) -> &[ListenerHandle] {
        self.coordinator.listeners()
    }

    /// Waits for every listener to stop.
    pub async fn wait(self) {
        self.coordinator.wait().await;
    }

    /// Triggers shutdown and waits for it.
    pub async fn shutdown(self) {
        self.coordinator.signal().trigger();
        self.wait().await;
    }
}
