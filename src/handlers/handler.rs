//! # Reconciliation handler abstraction.
//!
//! A [`Handler`] reconciles one object identified by an [`ObjectKey`], usually by
//! calling the backend adapter. The dispatcher only cares whether it succeeded,
//! failed transiently, or saw its context cancelled.
//!
//! The common handle type is [`HandlerRef`], an `Arc<dyn Handler>` shared by all
//! dispatcher workers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::queue::ObjectKey;

/// Shared handler handle.
pub type HandlerRef = Arc<dyn Handler>;

/// # Asynchronous, cancelable reconciliation step.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use nodevisor::{Handler, HandlerError, ObjectKey};
///
/// struct SyncStatus;
///
/// #[async_trait]
/// impl Handler for SyncStatus {
///     fn name(&self) -> &str { "sync-status" }
///
///     async fn handle(&self, ctx: CancellationToken, key: &ObjectKey) -> Result<(), HandlerError> {
///         if ctx.is_cancelled() {
///             return Err(HandlerError::Canceled);
///         }
///         let _ = key.name();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Stable, human-readable handler name.
    fn name(&self) -> &str;

    /// Reconciles the object behind `key`.
    ///
    /// Implementations should pass `ctx` down to the backend and return
    /// [`HandlerError::Canceled`] when it fires.
    async fn handle(&self, ctx: CancellationToken, key: &ObjectKey) -> Result<(), HandlerError>;
}
