//! Reader/writer serialization of the document root.
//!
//! Uploads take the write side, downloads and static serving take the read
//! side. Guards live inside the response body, so a reader keeps the tree
//! stable until its last byte is sent.

use std::sync::Arc;

use http_body_util::BodyExt;
use tokio::sync::RwLock;

use super::Middleware;
use crate::body::Guarded;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;

/// The lock shared by every [`SyncRead`] and [`SyncWrite`] of one server.
pub type TreeLock = Arc<RwLock<()>>;

pub struct SyncRead(pub TreeLock);

pub struct SyncWrite(pub TreeLock);

impl Middleware for SyncRead {
    fn name(&self) -> &'static str {
        "sync-read"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let lock = Arc::clone(&self.0);
        (move |req: Request| {
            let lock = Arc::clone(&lock);
            let next = Arc::clone(&next);
            async move {
                let guard = lock.read_owned().await;
                let res = next.call(req).await;
                res.map_body(|body| Guarded::new(body, guard).boxed_unsync())
            }
        })
        .into_boxed_handler()
    }
}

impl Middleware for SyncWrite {
    fn name(&self) -> &'static str {
        "sync-write"
    }

    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let lock = Arc::clone(&self.0);
        (move |req: Request| {
            let lock = Arc::clone(&lock);
            let next = Arc::clone(&next);
            async move {
                let guard = lock.write_owned().await;
                let res = next.call(req).await;
                res.map_body(|body| Guarded::new(body, guard).boxed_unsync())
            }
        })
        .into_boxed_handler()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::body;
    use crate::response::Response;

    fn request() -> Request {
        let inner = http::Request::builder().uri("/").body(body::empty()).unwrap();
        Request::new(inner, "127.0.0.1:1".parse().unwrap())
    }

    fn ok() -> BoxedHandler {
        (|_: Request| async { Response::text("ok") }).into_boxed_handler()
    }

    #[tokio::test]
    async fn test_writer_waits_for_unsent_reader_body() {
        let lock = TreeLock::default();
        let reader = SyncRead(Arc::clone(&lock)).wrap(ok());
        let writer = SyncWrite(Arc::clone(&lock)).wrap(ok());

        let pending_body = reader.call(request()).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), writer.call(request())).await;
        assert!(blocked.is_err(), "writer ran while a read body was in flight");

        drop(pending_body);
        let res = tokio::time::timeout(Duration::from_secs(1), writer.call(request())).await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_readers_share_the_lock() {
        let lock = TreeLock::default();
        let reader = SyncRead(Arc::clone(&lock)).wrap(ok());

        let first = reader.call(request()).await;
        let second = tokio::time::timeout(Duration::from_millis(200), reader.call(request())).await;
        assert!(second.is_ok());
        drop(first);
    }
}
