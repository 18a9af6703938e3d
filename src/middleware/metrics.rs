use std::sync::Arc;
use std::time::Instant;

use http_body_util::BodyExt;

use super::Middleware;
use crate::body::Observed;
use crate::endpoint::EndpointMapper;
use crate::handler::{BoxedHandler, Handler};
use crate::metrics::Metrics;
use crate::request::Request;

/// Records request duration and response size, labelled by status code,
/// endpoint label and method.
///
/// Both are observed when the response body has been sent (or dropped), so
/// a streamed download is timed and sized in full.
pub struct MetricsObserver {
    metrics: Metrics,
    endpoints: Arc<EndpointMapper>,
}

impl MetricsObserver {
    pub fn new(metrics: Metrics, endpoints: Arc<EndpointMapper>) -> Self {
        Self { metrics, endpoints }
    }
}

impl Middleware for MetricsObserver {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let metrics = self.metrics.clone();
        let endpoints = Arc::clone(&self.endpoints);
        (move |req: Request| {
            let start = Instant::now();
            let endpoint = endpoints.map(req.path()).to_owned();
            let method = req.method().as_str().to_owned();
            let metrics = metrics.clone();
            let next = Arc::clone(&next);
            async move {
                let res = next.call(req).await;
                let code = res.status_code().as_u16().to_string();
                res.map_body(move |body| {
                    Observed::new(body, move |bytes| {
                        let seconds = start.elapsed().as_secs_f64();
                        metrics.observe_request([code.as_str(), endpoint.as_str(), method.as_str()], seconds, bytes);
                    })
                    .boxed_unsync()
                })
            }
        })
        .into_boxed_handler()
    }
}
