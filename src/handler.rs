//! Handlers and their erased form.
//!
//! Routes, mounts and middlewares all deal in one type, [`BoxedHandler`].
//! An `async fn(Request) -> impl IntoResponse`, or a closure returning an
//! `async` block, becomes one through [`Handler::into_boxed_handler`]:
//!
//! ```text
//! files::serve_dir(root)        closure
//!   └─ into_boxed_handler()     Arc<Func<closure>>
//!        └─ chain.apply(..)     each middleware wraps the Arc in another
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Object-safe call interface behind [`BoxedHandler`].
#[doc(hidden)]
pub trait Dispatch: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A handler shared by every request on every connection.
pub type BoxedHandler = Arc<dyn Dispatch>;

/// Anything that can answer a [`Request`].
pub trait Handler: Send + Sync + 'static {
    fn into_boxed_handler(self) -> BoxedHandler;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse + Send,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(Func(self))
    }
}

struct Func<F>(F);

impl<F, Fut> Dispatch for Func<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: IntoResponse + Send,
{
    fn call(&self, req: Request) -> BoxFuture {
        let pending = (self.0)(req);
        Box::pin(async move { pending.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::body;

    #[tokio::test]
    async fn test_closures_and_fns_erase_to_the_same_type() {
        async fn named(_: Request) -> &'static str {
            "named"
        }
        let prefix = String::from("closure:");
        let handlers: Vec<BoxedHandler> = vec![
            named.into_boxed_handler(),
            (move |req: Request| {
                let reply = format!("{prefix}{}", req.path());
                async move { reply }
            })
            .into_boxed_handler(),
        ];

        let mut replies = Vec::new();
        for handler in &handlers {
            let req = http::Request::builder().uri("/x").body(body::empty()).unwrap();
            let res = handler.call(Request::new(req, "127.0.0.1:1".parse().unwrap())).await;
            let bytes = res.into_body().collect().await.unwrap().to_bytes();
            replies.push(String::from_utf8(bytes.to_vec()).unwrap());
        }
        assert_eq!(replies, ["named", "closure:/x"]);
    }
}
