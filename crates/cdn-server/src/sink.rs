//! Per-request error collection
//!
//! Best-effort work (cache lookups, write-backs, cache removals) reports its
//! failures into a [`RequestErrorSink`] instead of the response. Each clone
//! of the sink is one outstanding producer; the [`ErrorAggregator`] drains
//! until every clone has been dropped, attaching each error to the request
//! span as it arrives.

use cdn_db::StoreError;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::{debug, warn, Span};

const SINK_CAPACITY: usize = 16;

struct SinkEntry {
    operation: &'static str,
    error: StoreError,
}

#[derive(Clone)]
pub struct RequestErrorSink {
    tx: mpsc::Sender<SinkEntry>,
}

pub struct ErrorAggregator {
    rx: mpsc::Receiver<SinkEntry>,
    span: Span,
}

/// What an aggregator saw over the life of one request
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkReport {
    pub misses: usize,
    pub failures: usize,
}

impl RequestErrorSink {
    /// A sink whose errors are recorded on `span`
    pub fn new(span: Span) -> (Self, ErrorAggregator) {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        (Self { tx }, ErrorAggregator { rx, span })
    }

    pub async fn record(&self, operation: &'static str, error: StoreError) {
        if self.tx.send(SinkEntry { operation, error }).await.is_err() {
            debug!(operation, "Error sink already drained");
        }
    }

    /// Run `work` in the background; its error, if any, lands in this sink
    pub fn spawn<F>(&self, operation: &'static str, work: F)
    where
        F: Future<Output = cdn_db::error::Result<()>> + Send + 'static,
    {
        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(error) = work.await {
                sink.record(operation, error).await;
            }
        });
    }
}

impl ErrorAggregator {
    pub async fn drain(mut self) -> SinkReport {
        let mut report = SinkReport::default();

        while let Some(entry) = self.rx.recv().await {
            if entry.error.is_miss() {
                report.misses += 1;
                debug!(parent: &self.span, operation = entry.operation, error = %entry.error, "Store miss");
            } else {
                report.failures += 1;
                warn!(parent: &self.span, operation = entry.operation, error = %entry.error, "Best-effort store operation failed");
            }
            self.span
                .record("error.count", (report.misses + report.failures) as u64);
        }

        if report.failures > 0 {
            self.span.record("otel.status_code", "ERROR");
        }
        report
    }
}
