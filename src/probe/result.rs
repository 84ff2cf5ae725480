use std::time::SystemTime;

use crate::error::ProbeError;

/// Outcome of one probe cycle. Immutable once published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    /// When the backend call started, or when the cycle gave up waiting for it.
    pub observed_at: SystemTime,
    /// `None` if the backend answered successfully.
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    /// Successful probe observed at `at`.
    pub fn healthy(at: SystemTime) -> Self {
        Self {
            observed_at: at,
            error: None,
        }
    }

    /// Failed probe observed at `at`.
    pub fn unhealthy(at: SystemTime, error: ProbeError) -> Self {
        Self {
            observed_at: at,
            error: Some(error),
        }
    }

    /// True if the backend answered successfully.
    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}
