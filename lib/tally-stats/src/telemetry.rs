use metrics::{counter, gauge, Counter, Gauge};

/// Why a recorded batch of measurements was dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DropReason {
    NegativeValue,
    QueueFull,
    CollectionDisabled,
    WorkerStopped,
}

/// Internal telemetry of the stats engine.
#[derive(Clone)]
pub(crate) struct Telemetry {
    dropped_negative_value: Counter,
    dropped_queue_full: Counter,
    dropped_collection_disabled: Counter,
    dropped_worker_stopped: Counter,
    batches_recorded: Counter,
    measurements_applied: Counter,
    clock_skew: Counter,
    registered_views: Gauge,
    queue_depth: Gauge,
}

impl Telemetry {
    pub fn new() -> Self {
        const DROPPED: &str = "tally_stats_batches_dropped_total";

        Self {
            dropped_negative_value: counter!(DROPPED, "reason" => "negative_value"),
            dropped_queue_full: counter!(DROPPED, "reason" => "queue_full"),
            dropped_collection_disabled: counter!(DROPPED, "reason" => "collection_disabled"),
            dropped_worker_stopped: counter!(DROPPED, "reason" => "worker_stopped"),
            batches_recorded: counter!("tally_stats_batches_recorded_total"),
            measurements_applied: counter!("tally_stats_measurements_applied_total"),
            clock_skew: counter!("tally_stats_clock_skew_total"),
            registered_views: gauge!("tally_stats_registered_views"),
            queue_depth: gauge!("tally_stats_queue_depth"),
        }
    }

    #[cfg(test)]
    pub fn noop() -> Self {
        Self {
            dropped_negative_value: Counter::noop(),
            dropped_queue_full: Counter::noop(),
            dropped_collection_disabled: Counter::noop(),
            dropped_worker_stopped: Counter::noop(),
            batches_recorded: Counter::noop(),
            measurements_applied: Counter::noop(),
            clock_skew: Counter::noop(),
            registered_views: Gauge::noop(),
            queue_depth: Gauge::noop(),
        }
    }

    pub fn increment_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::NegativeValue => &self.dropped_negative_value,
            DropReason::QueueFull => &self.dropped_queue_full,
            DropReason::CollectionDisabled => &self.dropped_collection_disabled,
            DropReason::WorkerStopped => &self.dropped_worker_stopped,
        };
        counter.increment(1);
    }

    pub fn increment_batches_recorded(&self) {
        self.batches_recorded.increment(1);
    }

    pub fn increment_measurements_applied(&self, count: usize) {
        self.measurements_applied.increment(count as u64);
    }

    pub fn increment_clock_skew(&self) {
        self.clock_skew.increment(1);
    }

    pub fn set_registered_views(&self, count: usize) {
        self.registered_views.set(count as f64);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }
}
