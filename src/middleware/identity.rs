use std::sync::Arc;

use http::header::{HeaderValue, SERVER};

use super::Middleware;
use crate::handler::{BoxedHandler, Handler};
use crate::info::Info;
use crate::request::Request;

/// Sets `Server: <name> <version>` on every response.
pub struct ServerHeader {
    value: HeaderValue,
}

impl ServerHeader {
    pub fn new(info: &Info) -> Self {
        let value = HeaderValue::from_str(&info.server_header())
            .unwrap_or_else(|_| HeaderValue::from_static(env!("CARGO_PKG_NAME")));
        Self { value }
    }
}

impl Middleware for ServerHeader {
    fn name(&self) -> &'static str {
        "server-header"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let value = self.value.clone();
        (move |req: Request| {
            let next = Arc::clone(&next);
            let value = value.clone();
            async move {
                let mut res = next.call(req).await;
                res.headers_mut().insert(SERVER, value);
                res
            }
        })
        .into_boxed_handler()
    }
}
