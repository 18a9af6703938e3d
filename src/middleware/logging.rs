use std::sync::Arc;

use tracing::info;

use super::Middleware;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;

/// Logs every request at `info` and forwards it.
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "request-logger"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (move |req: Request| {
            info!(
                method = %req.method(),
                path = %req.uri(),
                remote = %req.remote_addr(),
                "request from client"
            );
            let next = Arc::clone(&next);
            async move { next.call(req).await }
        })
        .into_boxed_handler()
    }
}
