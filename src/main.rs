//! docserve binary: flags and `DOCSERVE_*` environment variables in, a
//! running server out.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use docserve::auth::CredentialSet;
use docserve::{Config, Info, Server};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "docserve")]
#[command(about = "Serve a document root over HTTP and move whole subtrees in and out as tar.gz")]
#[command(version)]
struct Args {
    /// Address of the main listener
    #[arg(long, default_value = "0.0.0.0:8080", env = "DOCSERVE_LISTEN_ADDR")]
    listen_addr: SocketAddr,

    /// Directory to serve
    #[arg(long, default_value = ".", env = "DOCSERVE_DOC_ROOT")]
    doc_root: PathBuf,

    /// URL prefix the document root is served under
    #[arg(long, default_value = "/", env = "DOCSERVE_PREFIX")]
    prefix: String,

    /// Path accepting tar.gz and plain file uploads
    #[arg(long, env = "DOCSERVE_UPLOAD_ENDPOINT")]
    upload_endpoint: Option<String>,

    /// Path serving tar.gz downloads
    #[arg(long, env = "DOCSERVE_DOWNLOAD_ENDPOINT")]
    download_endpoint: Option<String>,

    /// Milliseconds to wait for in-flight requests on shutdown
    #[arg(long, default_value_t = 1000, env = "DOCSERVE_SHUTDOWN_TIMEOUT_MS")]
    shutdown_timeout_ms: u64,

    /// Base64 encoded htpasswd content guarding reads
    #[arg(long, env = "DOCSERVE_READ_AUTHORIZATIONS", hide_env_values = true)]
    read_authorizations: Option<String>,

    /// Base64 encoded htpasswd content guarding uploads
    #[arg(long, env = "DOCSERVE_WRITE_AUTHORIZATIONS", hide_env_values = true)]
    write_authorizations: Option<String>,

    /// Expose Prometheus metrics
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "DOCSERVE_METRICS_ENABLED")]
    metrics_enabled: bool,

    /// Path serving Prometheus metrics
    #[arg(long, default_value = "/metrics", env = "DOCSERVE_METRICS_PATH")]
    metrics_path: String,

    /// Serve metrics from this address instead of the main listener
    #[arg(long, env = "DOCSERVE_METRICS_LISTEN_ADDR")]
    metrics_listen_addr: Option<SocketAddr>,

    /// Serialize uploads against downloads and static serving
    #[arg(long, env = "DOCSERVE_SYNC_TRANSFERS")]
    sync_transfers: bool,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info", env = "DOCSERVE_LOG_LEVEL")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "DOCSERVE_LOG_FORMAT")]
    log_format: LogFormat,

    /// Build identifier reported by /status
    #[arg(long, default_value = "", env = "DOCSERVE_BUILD")]
    build: String,

    /// Build time reported by /status
    #[arg(long, default_value = "", env = "DOCSERVE_BUILD_TIME")]
    build_time: String,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = Config::default()
            .with_listen_addr(self.listen_addr)
            .with_doc_root(self.doc_root)
            .with_prefix(self.prefix)
            .with_shutdown_timeout(Duration::from_millis(self.shutdown_timeout_ms))
            .with_metrics_enabled(self.metrics_enabled)
            .with_metrics_path(self.metrics_path)
            .with_sync_transfers(self.sync_transfers)
            .with_info(Info { build: self.build, build_time: self.build_time, ..Info::default() });

        if let Some(endpoint) = self.upload_endpoint {
            config = config.with_upload_endpoint(endpoint);
        }
        if let Some(endpoint) = self.download_endpoint {
            config = config.with_download_endpoint(endpoint);
        }
        if let Some(addr) = self.metrics_listen_addr {
            config = config.with_metrics_listen_addr(addr);
        }
        if let Some(encoded) = self.read_authorizations {
            let credentials = CredentialSet::from_base64(&encoded).context("read authorizations")?;
            config = config.with_read_authorizations(credentials);
        }
        if let Some(encoded) = self.write_authorizations {
            let credentials = CredentialSet::from_base64(&encoded).context("write authorizations")?;
            config = config.with_write_authorizations(credentials);
        }
        Ok(config)
    }
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format);

    let config = args.into_config()?;
    let server = Server::new(config).context("building server")?;
    server.serve().await.context("serving")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_map_onto_config() {
        let args = Args::parse_from([
            "docserve",
            "--doc-root",
            "/srv",
            "--upload-endpoint",
            "/upload",
            "--metrics-enabled",
            "false",
            "--shutdown-timeout-ms",
            "250",
        ]);
        let config = args.into_config().unwrap();

        assert_eq!(config.doc_root, PathBuf::from("/srv"));
        assert_eq!(config.upload_endpoint.as_deref(), Some("/upload"));
        assert!(!config.metrics_enabled);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
        assert!(config.download_endpoint.is_none());
    }
}
