//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Bodies are always a [`Body`], so a handler can answer with a short
//! message or with a stream produced on a blocking thread.

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use crate::body::{self, Body};

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use docserve::Response;
/// use http::StatusCode;
///
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::builder()
///     .status(StatusCode::BAD_REQUEST)
///     .text("bad deploy path");
/// ```
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl Response {
    /// `200 OK` with `application/json`.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// `200 OK` with `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::builder().html(body)
    }

    /// `200 OK` streaming `body` with the given content type.
    pub fn stream(content_type: HeaderValue, body: Body) -> Self {
        Self::builder().stream(content_type, body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: body::empty() }
    }

    /// Plain-text error response; the message doubles as the body.
    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        Self::builder().status(code).text(message)
    }

    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "404 page not found")
    }

    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Replaces the body with `f(body)`, keeping status and headers.
    pub fn map_body(self, f: impl FnOnce(Body) -> Body) -> Self {
        Self { status: self.status, headers: self.headers, body: f(self.body) }
    }

    pub(crate) fn into_inner(self) -> http::Response<Body> {
        let mut res = http::Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish(HeaderValue::from_static(APPLICATION_JSON), body::full(body))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(HeaderValue::from_static(TEXT_PLAIN), body::full(body.into()))
    }

    pub fn html(self, body: impl Into<String>) -> Response {
        self.finish(HeaderValue::from_static(TEXT_HTML), body::full(body.into()))
    }

    pub fn stream(self, content_type: HeaderValue, body: Body) -> Response {
        self.finish(content_type, body)
    }

    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: body::empty() }
    }

    fn finish(mut self, content_type: HeaderValue, body: Body) -> Response {
        self.headers.insert(CONTENT_TYPE, content_type);
        Response { status: self.status, headers: self.headers, body }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[tokio::test]
    async fn test_error_carries_plain_text_message() {
        let res = Response::error(StatusCode::BAD_REQUEST, "nope");
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()[CONTENT_TYPE], TEXT_PLAIN);

        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"nope");
    }

    #[test]
    fn test_into_inner_keeps_status_and_headers() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header(http::header::LOCATION, HeaderValue::from_static("/x"))
            .no_body()
            .into_inner();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[http::header::LOCATION], "/x");
    }
}
