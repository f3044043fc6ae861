//! View materializers.
//!
//! A materializer owns every aggregator for one registered view, keyed by tag tuple, and turns them into
//! [`ViewData`] snapshots on demand.
use crate::{
    data::{Attachments, ViewData},
    telemetry::Telemetry,
    time::Timestamp,
    tuple::TagTuple,
    view::{View, Window},
};

mod cumulative;
pub(crate) use self::cumulative::CumulativeMaterializer;

mod interval;
pub(crate) use self::interval::IntervalMaterializer;

pub(crate) enum Materializer {
    Cumulative(CumulativeMaterializer),
    Interval(IntervalMaterializer),
}

impl Materializer {
    /// Creates an empty materializer for `view`, whose window starts at `now`.
    pub fn new(view: View, now: Timestamp, interval_bucket_count: usize) -> Self {
        match view.window() {
            Window::Cumulative => Self::Cumulative(CumulativeMaterializer::new(view, now)),
            Window::Interval(duration) => {
                Self::Interval(IntervalMaterializer::new(view, duration, interval_bucket_count, now))
            }
        }
    }

    pub fn view(&self) -> &View {
        match self {
            Self::Cumulative(inner) => inner.view(),
            Self::Interval(inner) => inner.view(),
        }
    }

    pub fn record(
        &mut self, tuple: TagTuple, value: f64, attachments: &Attachments, timestamp: Timestamp, telemetry: &Telemetry,
    ) {
        match self {
            Self::Cumulative(inner) => inner.record(tuple, value, attachments, timestamp),
            Self::Interval(inner) => inner.record(tuple, value, attachments, timestamp, telemetry),
        }
    }

    pub fn snapshot(&mut self, now: Timestamp) -> ViewData {
        match self {
            Self::Cumulative(inner) => inner.snapshot(now),
            Self::Interval(inner) => inner.snapshot(now),
        }
    }

    /// Discards all aggregated data.
    pub fn clear_stats(&mut self) {
        match self {
            Self::Cumulative(inner) => inner.clear_stats(),
            Self::Interval(inner) => inner.clear_stats(),
        }
    }

    /// Restarts aggregation after collection has been re-enabled.
    pub fn resume_stats_collection(&mut self, now: Timestamp) {
        match self {
            Self::Cumulative(inner) => inner.resume_stats_collection(now),
            Self::Interval(inner) => inner.resume_stats_collection(now),
        }
    }
}
