//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(CancellationToken, ObjectKey) -> Fut`,
//! producing a fresh future per call. Shared state goes into the closure
//! explicitly (`Arc<...>`).
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use nodevisor::{HandlerError, HandlerFn, HandlerRef, ObjectKey};
//!
//! let h: HandlerRef = HandlerFn::arc("delete-pod", |_ctx: CancellationToken, key: ObjectKey| async move {
//!     if key.namespace().is_none() {
//!         return Err(HandlerError::fail("pods are namespaced"));
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(h.name(), "delete-pod");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::handlers::handler::Handler;
use crate::queue::ObjectKey;

/// Function-backed handler implementation.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(CancellationToken, ObjectKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: CancellationToken, key: &ObjectKey) -> Result<(), HandlerError> {
        (self.f)(ctx, key.clone()).await
    }
}
