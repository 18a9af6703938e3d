//! Crate-level error type.
//!
//! Request-level failures (a hostile deploy path, a bad archive, missing
//! credentials) are HTTP responses, not `Error`s. This type covers what can
//! go wrong while building and running the server.

use std::io;
use std::net::SocketAddr;

use crate::auth::CredentialsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed binding {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed installing {signal} handler: {source}")]
    Signal { signal: &'static str, source: io::Error },

    #[error("invalid route {path}: {source}")]
    Route { path: String, source: matchit::InsertError },

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),
}
