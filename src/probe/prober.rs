//! # Backend health probe abstraction.
//!
//! A [`Prober`] asks the backend adapter whether it is reachable. The controller
//! passes a per-call [`CancellationToken`] that fires once every cycle waiting on
//! the call has timed out or been cancelled; honouring it is up to the implementation.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Shared prober handle.
pub type ProberRef = Arc<dyn Prober>;

/// Asynchronous backend probe.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    /// Human-readable name (appears in panic reasons).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Checks the backend once.
    async fn probe(&self, ctx: CancellationToken) -> Result<(), ProviderError>;
}

/// Closure-backed [`Prober`].
///
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use nodevisor::{ProbeFn, ProberRef, ProviderError};
///
/// let p: ProberRef = ProbeFn::arc("ping", |_ctx: CancellationToken| async {
///     Ok::<(), ProviderError>(())
/// });
/// assert_eq!(p.name(), "ping");
/// ```
#[derive(Debug)]
pub struct ProbeFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ProbeFn<F> {
    /// Creates a new function-backed prober.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the prober and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Prober for ProbeFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProviderError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, ctx: CancellationToken) -> Result<(), ProviderError> {
        (self.f)(ctx).await
    }
}
