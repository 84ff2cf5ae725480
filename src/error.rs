//! Error types used by the control-loop engine, its handlers and its collaborators.
//!
//! - [`HandlerError`] — outcome of a single reconciliation handler call.
//! - [`DispatchError`] — failures surfaced by the retry dispatcher (abandonment, bad items).
//! - [`ProbeError`] — why a probe cycle produced an unhealthy [`ProbeResult`](crate::ProbeResult).
//! - [`ProviderError`] — failures reported by the backend adapter.
//! - [`ConfigError`] — rejected construction parameters.
//! - [`WaitError`] — the caller's own context ended while waiting.
//! - [`FlightError`] — a shared in-flight call panicked.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by a reconciliation handler.
///
/// `Fail` is transient and retried with backoff; `Canceled` means the worker's
/// context ended and the item is dropped without retry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler failed but may succeed if retried.
    #[error("sync failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// Handler observed cancellation of its context.
    #[error("context cancelled")]
    Canceled,
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Fail`].
    pub fn fail(reason: impl Into<String>) -> Self {
        HandlerError::Fail {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::HandlerError;
    ///
    /// assert_eq!(HandlerError::fail("boom").as_label(), "handler_failed");
    /// assert_eq!(HandlerError::Canceled.as_label(), "handler_canceled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Canceled => "handler_canceled",
        }
    }

    /// Indicates whether the dispatcher may requeue the key after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Fail { .. })
    }
}

/// # Errors surfaced by the retry dispatcher.
///
/// These are the failures expected to be escalated to an operator: the key was
/// dropped and will only be processed again after a new external trigger.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Retry ceiling reached; the key was forgotten.
    #[error("forgetting {key:?} due to maximum retries ({retries}) reached: {source}")]
    RetriesExhausted {
        /// Key that was abandoned.
        key: String,
        /// Number of requeues performed before giving up.
        retries: u32,
        /// Last handler error.
        #[source]
        source: HandlerError,
    },

    /// Item taken from the queue is not a well-formed object key.
    #[error("expected object key in work queue item but got {key:?}")]
    InvalidKey {
        /// The raw item as it came off the queue.
        key: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::RetriesExhausted { .. } => "dispatch_retries_exhausted",
            DispatchError::InvalidKey { .. } => "dispatch_invalid_key",
        }
    }
}

/// # Reasons a probe cycle reported the backend as unhealthy.
///
/// Cloneable because one outcome is shared by every reader of the
/// [`BroadcastCell`](crate::BroadcastCell) and every joiner of a probe flight.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The backend did not answer within the configured probe timeout.
    #[error("probe timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The cycle's context was cancelled before the backend answered.
    #[error("probe cancelled")]
    Canceled,

    /// The backend answered with an error.
    #[error("provider probe failed: {reason}")]
    Provider {
        /// Message reported by the provider.
        reason: Arc<str>,
    },

    /// The probe call panicked inside the provider.
    #[error("provider probe panicked: {reason}")]
    Panicked {
        /// Panic payload, if it was a string.
        reason: Arc<str>,
    },
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use nodevisor::ProbeError;
    /// use std::time::Duration;
    ///
    /// let err = ProbeError::Timeout { timeout: Duration::from_millis(50) };
    /// assert_eq!(err.as_label(), "probe_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "probe_timeout",
            ProbeError::Canceled => "probe_canceled",
            ProbeError::Provider { .. } => "probe_provider_failed",
            ProbeError::Panicked { .. } => "probe_panicked",
        }
    }
}

/// # Errors returned by the backend adapter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The backend cannot be reached at all.
    #[error("backend unavailable: {reason}")]
    Unavailable {
        /// Transport or connectivity detail.
        reason: String,
    },

    /// The backend was reached but the operation failed.
    #[error("backend operation failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// The adapter honoured cancellation of its context.
    #[error("context cancelled")]
    Canceled,
}

impl ProviderError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Unavailable { .. } => "provider_unavailable",
            ProviderError::Fail { .. } => "provider_failed",
            ProviderError::Canceled => "provider_canceled",
        }
    }
}

impl From<ProviderError> for ProbeError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Canceled => ProbeError::Canceled,
            other => ProbeError::Provider {
                reason: other.to_string().into(),
            },
        }
    }
}

impl From<ProviderError> for HandlerError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Canceled => HandlerError::Canceled,
            other => HandlerError::Fail {
                reason: other.to_string(),
            },
        }
    }
}

/// # Rejected construction parameters.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Probe interval must be greater than zero.
    #[error("node probe interval is zero")]
    ZeroInterval,

    /// An explicit probe timeout must be greater than zero.
    #[error("node probe timeout is zero")]
    ZeroTimeout,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ZeroInterval => "config_zero_interval",
            ConfigError::ZeroTimeout => "config_zero_timeout",
        }
    }
}

/// # Failure of a shared in-flight call itself (not of the value it computes).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlightError {
    /// The call panicked; carries the panic message.
    #[error("in-flight call panicked: {0}")]
    Panicked(Arc<str>),
}

impl FlightError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FlightError::Panicked(_) => "flight_panicked",
        }
    }
}

/// # The caller's context ended while it was waiting.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// Cancellation token fired before a value was available.
    #[error("context cancelled")]
    Canceled,
}

impl WaitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WaitError::Canceled => "wait_canceled",
        }
    }
}
