//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use http::{HeaderMap, Method, Uri};

use crate::body::Body;

/// An incoming HTTP request with a streaming body.
pub struct Request {
    inner: http::Request<Body>,
    params: HashMap<String, String>,
    remote_addr: SocketAddr,
}

impl Request {
    pub fn new(inner: http::Request<Body>, remote_addr: SocketAddr) -> Self {
        Self { inner, params: HashMap::new(), remote_addr }
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn method(&self) -> &Method { self.inner.method() }
    pub fn uri(&self) -> &Uri { self.inner.uri() }
    pub fn headers(&self) -> &HeaderMap { self.inner.headers() }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// The request path as received, before any route prefix is stripped.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// Header lookup. Values that are not visible ASCII read as absent.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// Mounted handlers see the part of the path below their mount point as
    /// `filepath`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn into_body(self) -> Body {
        self.inner.into_body()
    }
}
