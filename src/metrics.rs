//! Prometheus metrics.
//!
//! Every [`Server`](crate::Server) owns its own [`Registry`], so several
//! servers (or tests) in one process never collide on metric names.

use http::StatusCode;
use http::header::HeaderValue;
use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, Registry, TextEncoder};
use tracing::error;

use crate::request::Request;
use crate::response::Response;

/// Labels of the per-request histograms, in `with_label_values` order.
pub const HTTP_LABELS: [&str; 3] = ["code", "endpoint", "method"];

/// Prometheus' default latency buckets.
pub fn default_duration_buckets() -> Vec<f64> {
    prometheus::DEFAULT_BUCKETS.to_vec()
}

/// 64 B up to 64 MiB, quadrupling.
pub fn default_size_buckets() -> Vec<f64> {
    (0..11).map(|i| 64.0 * 4f64.powi(i)).collect()
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    request_duration: HistogramVec,
    response_size: HistogramVec,
    upload_size: Histogram,
}

impl Metrics {
    pub fn new(duration_buckets: Vec<f64>, size_buckets: Vec<f64>) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "Time spent serving HTTP requests")
                .buckets(duration_buckets),
            &HTTP_LABELS,
        )?;
        let response_size = HistogramVec::new(
            HistogramOpts::new("http_response_size_bytes", "Size of HTTP response bodies")
                .buckets(size_buckets.clone()),
            &HTTP_LABELS,
        )?;
        let upload_size = Histogram::with_opts(
            HistogramOpts::new("docserve_upload_size", "Bytes written by successful uploads")
                .buckets(size_buckets),
        )?;

        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(response_size.clone()))?;
        registry.register(Box::new(upload_size.clone()))?;

        Ok(Self { registry, request_duration, response_size, upload_size })
    }

    pub fn observe_upload(&self, bytes: u64) {
        self.upload_size.observe(bytes as f64);
    }

    pub(crate) fn observe_request(&self, labels: [&str; 3], seconds: f64, bytes: u64) {
        self.request_duration.with_label_values(&labels).observe(seconds);
        self.response_size.with_label_values(&labels).observe(bytes as f64);
    }

    /// Text exposition of everything in the registry.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }
}

/// Handler serving [`Metrics::render`].
pub fn handler(metrics: Metrics) -> impl crate::Handler {
    move |_: Request| {
        let rendered = metrics.render();
        async move {
            match rendered {
                Ok(buf) => Response::stream(
                    HeaderValue::from_static("text/plain; version=0.0.4"),
                    crate::body::full(buf),
                ),
                Err(e) => {
                    error!(error = %e, "failed encoding metrics");
                    Response::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_observations() {
        let metrics = Metrics::new(default_duration_buckets(), default_size_buckets()).unwrap();
        metrics.observe_upload(20);
        metrics.observe_request(["200", "/static", "GET"], 0.01, 5);

        let text = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(text.contains("docserve_upload_size_count 1"));
        assert!(text.contains("docserve_upload_size_sum 20"));
        assert!(
            text.lines()
                .any(|l| l.starts_with("http_response_size_bytes_count") && l.contains(r#"endpoint="/static""#))
        );
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new(default_duration_buckets(), default_size_buckets()).unwrap();
        let b = Metrics::new(default_duration_buckets(), default_size_buckets()).unwrap();
        a.observe_upload(1);

        let text = String::from_utf8(b.render().unwrap()).unwrap();
        assert!(text.contains("docserve_upload_size_count 0"));
    }

    #[test]
    fn test_bad_buckets_are_rejected() {
        assert!(Metrics::new(default_duration_buckets(), vec![2.0, 1.0]).is_err());
    }

    #[test]
    fn test_size_buckets_span_64_bytes_to_64_mib() {
        let buckets = default_size_buckets();
        assert_eq!(buckets.first(), Some(&64.0));
        assert_eq!(buckets.last(), Some(&(64.0 * 1024.0 * 1024.0)));
    }
}
