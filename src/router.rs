//! Request router.
//!
//! Exact routes live in one radix tree per HTTP method. Mounts catch every
//! `GET` below a path prefix and are only consulted when no exact route
//! matched, so a mount on `/` never shadows `/status` or the transfer
//! endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

/// Parameter under which a mount receives the path below its prefix.
pub const MOUNT_PARAM: &str = "filepath";

/// The application router. Build it once at startup.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    // Longest prefix first.
    mounts: Vec<(String, BoxedHandler)>,
    fallback: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            mounts: Vec::new(),
            fallback: (|_: Request| async { Response::not_found() }).into_boxed_handler(),
        }
    }

    /// Registers a handler for a method + path pair.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.on_boxed(method, path, handler.into_boxed_handler())
    }

    pub fn on_boxed(mut self, method: Method, path: &str, handler: BoxedHandler) -> Result<Self, Error> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler)
            .map_err(|source| Error::Route { path: path.to_owned(), source })?;
        Ok(self)
    }

    /// Serves every `GET` at or below `prefix` with `handler`.
    ///
    /// The prefix matches whole path segments: a mount on `/static` serves
    /// `/static` and `/static/a.txt` but not `/statics`.
    pub fn mount(mut self, prefix: &str, handler: BoxedHandler) -> Self {
        let prefix = prefix.trim_end_matches('/').to_owned();
        self.mounts.push((prefix, handler));
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Answers requests nothing else matched. Defaults to a plain-text 404.
    pub fn fallback(mut self, handler: BoxedHandler) -> Self {
        self.fallback = handler;
        self
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        if let Some(found) = self.lookup_route(method, path) {
            return Some(found);
        }
        if *method != Method::GET {
            return None;
        }
        self.mounts.iter().find_map(|(prefix, handler)| {
            let rest = path.strip_prefix(prefix.as_str())?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            let rest = if rest.is_empty() { "/" } else { rest };
            let params = HashMap::from([(MOUNT_PARAM.to_owned(), rest.to_owned())]);
            Some((Arc::clone(handler), params))
        })
    }

    fn lookup_route(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Some((Arc::clone(matched.value), params))
    }

    /// Routes one request and produces one response.
    pub async fn route(&self, req: Request) -> Response {
        let found = self.lookup(req.method(), req.path());
        match found {
            Some((handler, params)) => handler.call(req.with_params(params)).await,
            None => self.fallback.call(req).await,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::body;

    async fn echo_filepath(req: Request) -> Response {
        Response::text(req.param(MOUNT_PARAM).unwrap_or("-").to_owned())
    }

    async fn fixed(_: Request) -> Response {
        Response::text("fixed")
    }

    fn request(method: Method, path: &str) -> Request {
        let inner = http::Request::builder().method(method).uri(path).body(body::empty()).unwrap();
        Request::new(inner, "127.0.0.1:9".parse().unwrap())
    }

    async fn text(res: Response) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_exact_routes_win_over_mounts() {
        let router = Router::new()
            .on(Method::GET, "/status", fixed)
            .unwrap()
            .mount("/", echo_filepath.into_boxed_handler());

        assert_eq!(text(router.route(request(Method::GET, "/status")).await).await, "fixed");
        assert_eq!(text(router.route(request(Method::GET, "/a/b.txt")).await).await, "/a/b.txt");
        assert_eq!(text(router.route(request(Method::GET, "/")).await).await, "/");
    }

    #[tokio::test]
    async fn test_mount_matches_whole_segments() {
        let router = Router::new().mount("/static/", echo_filepath.into_boxed_handler());

        assert_eq!(text(router.route(request(Method::GET, "/static")).await).await, "/");
        assert_eq!(text(router.route(request(Method::GET, "/static/x")).await).await, "/x");
        let miss = router.route(request(Method::GET, "/statics/x")).await;
        assert_eq!(miss.status_code(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mounts_only_serve_get() {
        let router = Router::new().mount("/", echo_filepath.into_boxed_handler());
        let res = router.route(request(Method::POST, "/x")).await;
        assert_eq!(res.status_code(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fallback_answers_unmatched_requests() {
        let plain = Router::new().route(request(Method::DELETE, "/x")).await;
        assert_eq!(plain.status_code(), http::StatusCode::NOT_FOUND);
        assert_eq!(text(plain).await, "404 page not found");

        let router = Router::new().fallback(fixed.into_boxed_handler());
        assert_eq!(text(router.route(request(Method::GET, "/nowhere")).await).await, "fixed");
    }

    #[test]
    fn test_conflicting_routes_are_errors() {
        let result = Router::new()
            .on(Method::GET, "/status", fixed)
            .and_then(|r| r.on(Method::GET, "/status", fixed));
        assert!(matches!(result, Err(Error::Route { .. })));
    }
}
