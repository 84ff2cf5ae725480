//! # LogWriter — events to `tracing`
//!
//! A subscriber that renders every [`Event`] as a structured `tracing` record.
//! Levels follow the error taxonomy: transient trouble is `warn`, abandonment
//! is `error`, routine success is `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG item-processed source="pod-status" key="default/web" attempt=1
//!  WARN item-requeued source="pod-status" key="default/web" attempt=2 delay_ms=10 reason="backend busy"
//! ERROR item-abandoned source="pod-status" key="default/web" attempt=21 reason="forgetting ..."
//!  WARN probe-timed-out source="node-probe" timeout_ms=50
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let source = e.source.as_deref().unwrap_or("-");
        let key = e.key.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");

        match e.kind {
            EventKind::ItemProcessed => {
                debug!(seq = e.seq, source, key, attempt = ?e.attempt, "{label}");
            }
            EventKind::ItemRequeued => {
                warn!(seq = e.seq, source, key, attempt = ?e.attempt, delay_ms = ?e.delay_ms, reason, "{label}");
            }
            EventKind::ItemAbandoned => {
                error!(seq = e.seq, source, key, attempt = ?e.attempt, reason, "{label}");
            }
            EventKind::ItemCanceled => {
                debug!(seq = e.seq, source, key, "{label}");
            }
            EventKind::ItemInvalid => {
                warn!(seq = e.seq, source, key, reason, "{label}");
            }
            EventKind::QueueShutDown => {
                info!(seq = e.seq, source, "{label}");
            }
            EventKind::ProbeSucceeded => {
                debug!(seq = e.seq, source, "{label}");
            }
            EventKind::ProbeFailed => {
                warn!(seq = e.seq, source, reason, "{label}");
            }
            EventKind::ProbeTimedOut => {
                warn!(seq = e.seq, source, timeout_ms = ?e.timeout_ms, "{label}");
            }
            EventKind::ProbeCanceled => {
                warn!(seq = e.seq, source, "{label}");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                error!(seq = e.seq, subscriber = source, reason, "{label}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
