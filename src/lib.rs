//! # docserve
//!
//! Serves a document root over HTTP and moves whole directory subtrees in
//! and out of it as `tar.gz` streams.
//!
//! - `GET <prefix>/…` serves files, `index.html` or a directory listing.
//! - `POST <upload endpoint>` unpacks an `application/tar+gzip` body (or
//!   saves an `application/octet-stream` body) at the `Deploy-Path` header.
//! - `GET <download endpoint>` with `Accept: application/tar+gzip` streams
//!   the `Download-Path` header as an archive.
//! - `GET /status` and `GET /metrics` report identity and Prometheus metrics.
//!
//! Every client supplied path, including each entry name inside an uploaded
//! archive, goes through [`pathguard`] before the filesystem is touched.
//! Archives are never buffered: the codec in [`archive`] runs on the
//! blocking pool and talks to hyper through bounded channels.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docserve::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), docserve::Error> {
//!     let config = Config::default()
//!         .with_doc_root("/srv/www")
//!         .with_upload_endpoint("/upload")
//!         .with_download_endpoint("/download");
//!
//!     Server::new(config)?.serve().await
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod archive;
pub mod auth;
pub mod body;
pub mod config;
pub mod endpoint;
pub mod files;
pub mod info;
pub mod metrics;
pub mod middleware;
pub mod pathguard;
pub mod shutdown;
pub mod status;
pub mod transfer;

pub use config::Config;
pub use error::Error;
pub use handler::{BoxedHandler, Handler};
pub use info::Info;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Running, Server};
pub use shutdown::{ListenerState, ShutdownSignal};
