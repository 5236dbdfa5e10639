//! Metrics sink seam, accepted at construction but never backed by a concrete
//! exporter in this crate — wiring a real backend (OTLP, Prometheus, ...) is the
//! embedder's job, per `SPEC_FULL.md` §1.1.

/// Named events the supervisor reports at the same points it emits `tracing` spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEvent {
    ReconnectAttempt,
    ReconnectSucceeded,
    SubscriptionCreated,
    SubscriptionRemoved,
    DispatchSucceeded,
    DispatchFailed,
}

pub trait Reporter: Send + Sync + std::fmt::Debug {
    fn record(&self, event: ReportEvent);
}

/// Default no-op implementation, used when the embedder supplies none.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn record(&self, _event: ReportEvent) {}
}
