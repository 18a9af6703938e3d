//! Server configuration.
//!
//! ```rust
//! use std::time::Duration;
//! use docserve::Config;
//!
//! let config = Config::default()
//!     .with_doc_root("/srv/www")
//!     .with_upload_endpoint("/upload")
//!     .with_download_endpoint("/download")
//!     .with_shutdown_timeout(Duration::from_secs(5));
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::CredentialSet;
use crate::error::Error;
use crate::info::Info;
use crate::metrics;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Served, uploaded into and downloaded from. Relative paths are taken
    /// from the working directory at startup.
    pub doc_root: PathBuf,
    /// URL prefix the document root is served under.
    pub prefix: String,
    pub upload_endpoint: Option<String>,
    pub download_endpoint: Option<String>,
    /// How long listeners wait for in-flight requests on shutdown.
    pub shutdown_timeout: Duration,
    /// Required for every `GET` when set.
    pub read_authorizations: Option<CredentialSet>,
    /// Required for `POST`s to the upload endpoint when set.
    pub write_authorizations: Option<CredentialSet>,
    pub metrics_enabled: bool,
    pub metrics_path: String,
    /// Serve metrics from their own listener instead of the main one.
    pub metrics_listen_addr: Option<SocketAddr>,
    pub metrics_duration_buckets: Vec<f64>,
    pub metrics_size_buckets: Vec<f64>,
    /// Serialize uploads against downloads and static serving.
    pub sync_transfers: bool,
    pub info: Info,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            doc_root: PathBuf::from("."),
            prefix: "/".to_owned(),
            upload_endpoint: None,
            download_endpoint: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            read_authorizations: None,
            write_authorizations: None,
            metrics_enabled: true,
            metrics_path: DEFAULT_METRICS_PATH.to_owned(),
            metrics_listen_addr: None,
            metrics_duration_buckets: metrics::default_duration_buckets(),
            metrics_size_buckets: metrics::default_size_buckets(),
            sync_transfers: false,
            info: Info::default(),
        }
    }
}

impl Config {
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_doc_root(mut self, doc_root: impl Into<PathBuf>) -> Self {
        self.doc_root = doc_root.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_upload_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.upload_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_download_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.download_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_read_authorizations(mut self, credentials: CredentialSet) -> Self {
        self.read_authorizations = Some(credentials);
        self
    }

    pub fn with_write_authorizations(mut self, credentials: CredentialSet) -> Self {
        self.write_authorizations = Some(credentials);
        self
    }

    pub fn with_metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn with_metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = path.into();
        self
    }

    pub fn with_metrics_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.metrics_listen_addr = Some(addr);
        self
    }

    pub fn with_metrics_buckets(mut self, duration: Vec<f64>, size: Vec<f64>) -> Self {
        self.metrics_duration_buckets = duration;
        self.metrics_size_buckets = size;
        self
    }

    pub fn with_sync_transfers(mut self, enabled: bool) -> Self {
        self.sync_transfers = enabled;
        self
    }

    pub fn with_info(mut self, info: Info) -> Self {
        self.info = info;
        self
    }

    /// Rejects settings that cannot be turned into routes.
    pub fn validate(&self) -> Result<(), Error> {
        let mut paths = vec![("prefix", self.prefix.as_str()), ("metrics path", self.metrics_path.as_str())];
        paths.extend(self.upload_endpoint.as_deref().map(|p| ("upload endpoint", p)));
        paths.extend(self.download_endpoint.as_deref().map(|p| ("download endpoint", p)));
        for (what, path) in paths {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("{what} {path:?} must start with /")));
            }
        }
        let credentials = [("read", &self.read_authorizations), ("write", &self.write_authorizations)];
        for (what, set) in credentials {
            if set.as_ref().is_some_and(CredentialSet::is_empty) {
                return Err(Error::Config(format!("{what} authorizations list no users")));
            }
        }
        if self.metrics_listen_addr.is_some_and(|addr| addr == self.listen_addr && addr.port() != 0) {
            return Err(Error::Config("metrics listen address equals the main listen address".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.doc_root, PathBuf::from("."));
        assert_eq!(config.prefix, "/");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.metrics_enabled);
        assert_eq!(config.metrics_path, "/metrics");
        assert!(config.upload_endpoint.is_none());
        assert!(!config.sync_transfers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::default()
            .with_prefix("/static")
            .with_upload_endpoint("/upload")
            .with_metrics_enabled(false)
            .with_sync_transfers(true);
        assert_eq!(config.prefix, "/static");
        assert_eq!(config.upload_endpoint.as_deref(), Some("/upload"));
        assert!(!config.metrics_enabled);
        assert!(config.sync_transfers);
    }

    #[test]
    fn test_relative_routes_are_rejected() {
        let config = Config::default().with_upload_endpoint("upload");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_credentials_are_rejected() {
        let config = Config::default().with_write_authorizations(CredentialSet::default());
        assert!(matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("write")));
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"doc_root": "/srv", "download_endpoint": "/dl"}"#).unwrap();
        assert_eq!(config.doc_root, PathBuf::from("/srv"));
        assert_eq!(config.download_endpoint.as_deref(), Some("/dl"));
        assert_eq!(config.metrics_path, "/metrics");
    }
}
