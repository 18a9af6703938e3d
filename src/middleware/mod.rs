//! Middleware layer.
//!
//! A [`Middleware`] turns one handler into another. A [`Chain`] is an
//! ordered list of them: the first one listed is the outermost wrapper, so it
//! runs first and alone decides whether anything after it runs at all. The
//! terminal handler is innermost and only reached when every middleware
//! forwards.
//!
//! ```text
//! Chain::new().with(a).with(b).apply(h)   ==   a.wrap(b.wrap(h))
//!
//! request  ──► a ──► b ──► h
//! response ◄── a ◄── b ◄──┘
//! ```
//!
//! Composition is a right-to-left fold, so concatenating chains with
//! [`Chain::then`] gives the same handler as listing every middleware in one
//! chain.

mod auth;
mod identity;
mod logging;
mod metrics;
mod sync;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

pub use auth::AuthChecker;
pub use identity::ServerHeader;
pub use logging::RequestLogger;
pub use metrics::MetricsObserver;
pub use sync::{SyncRead, SyncWrite, TreeLock};

/// A request-intercepting layer.
pub trait Middleware: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Wraps `next`. The returned handler may answer on its own without
    /// calling `next`.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// An ordered, cheaply cloneable list of middlewares.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` as the innermost layer so far.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Appends `middleware` when present.
    pub fn with_optional(self, middleware: Option<impl Middleware>) -> Self {
        match middleware {
            Some(m) => self.with(m),
            None => self,
        }
    }

    /// Runs `self` outside of `other`.
    pub fn then(mut self, other: &Chain) -> Self {
        self.layers.extend(other.layers.iter().cloned());
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|m| m.name()).collect()
    }

    pub fn apply(&self, handler: impl Handler) -> BoxedHandler {
        self.apply_boxed(handler.into_boxed_handler())
    }

    pub fn apply_boxed(&self, handler: BoxedHandler) -> BoxedHandler {
        self.layers.iter().rev().fold(handler, |next, layer| layer.wrap(next))
    }
}
