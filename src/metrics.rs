use std::sync::atomic::{AtomicU64, Ordering};

/// Gateway operation tracked by [`GatewayMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Bulk upload of document chunks.
    Upload,
    /// Deletion of a document by filename.
    Delete,
    /// Neural search request.
    Search,
}

#[derive(Default)]
struct Outcomes {
    success: AtomicU64,
    error: AtomicU64,
}

impl Outcomes {
    fn record(&self, success: bool) {
        let counter = if success { &self.success } else { &self.error };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OutcomeCounts {
        OutcomeCounts {
            success: self.success.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }
}

/// Thread-safe counters describing gateway activity, split by outcome.
#[derive(Default)]
pub struct GatewayMetrics {
    uploads: Outcomes,
    deletes: Outcomes,
    searches: Outcomes,
}

impl GatewayMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one gateway operation.
    pub fn record(&self, operation: Operation, success: bool) {
        let outcomes = match operation {
            Operation::Upload => &self.uploads,
            Operation::Delete => &self.deletes,
            Operation::Search => &self.searches,
        };
        outcomes.record(success);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads: self.uploads.snapshot(),
            deletes: self.deletes.snapshot(),
            searches: self.searches.snapshot(),
        }
    }
}

/// Success and error totals for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct OutcomeCounts {
    /// Requests that completed successfully.
    pub success: u64,
    /// Requests that failed.
    pub error: u64,
}

/// Immutable view of gateway counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Bulk uploads since startup.
    pub uploads: OutcomeCounts,
    /// Document deletions since startup.
    pub deletes: OutcomeCounts,
    /// Neural searches since startup.
    pub searches: OutcomeCounts,
}
