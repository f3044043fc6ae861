use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle,
};

use ahash::AHashSet;
use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::{
    config::StatsConfiguration,
    data::ViewData,
    error::{EngineError, RegistrationError},
    export::{Metric, StatsMetricProducer},
    measure::Measurement,
    recorder::{spawn_worker, MeasureMap, RecordEntry, StatsRecorder, WorkItem},
    registry::{Registration, ViewRegistry},
    telemetry::{DropReason, Telemetry},
    time::{Clock, SystemClock},
    view::View,
};

/// Log a negative value warning for the first dropped batch, and then for every this-many batches after that.
const NEGATIVE_VALUE_WARN_EVERY: u64 = 1000;

/// Whether stats are being collected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectionState {
    /// Recorded measurements are aggregated.
    Enabled,

    /// Recorded measurements are dropped, and all aggregated data has been cleared.
    Disabled,
}

/// State shared between the engine, recorder handles, metric producers, and the recording worker.
pub(crate) struct Shared {
    registry: Mutex<ViewRegistry>,
    clock: Arc<dyn Clock>,
    enabled: AtomicBool,
    negative_value_measures: ArcSwap<AHashSet<String>>,
    negative_value_drops: AtomicU64,
    telemetry: Telemetry,
}

impl Shared {
    pub fn new(config: &StatsConfiguration, clock: Arc<dyn Clock>, telemetry: Telemetry) -> Self {
        Self {
            registry: Mutex::new(ViewRegistry::new(config.interval_bucket_count(), telemetry.clone())),
            clock,
            enabled: AtomicBool::new(config.collection_enabled()),
            negative_value_measures: ArcSwap::from_pointee(AHashSet::new()),
            negative_value_drops: AtomicU64::new(0),
            telemetry,
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, ViewRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn clock(&self) -> &dyn Clock {
        &*self.clock
    }

    /// Validates a batch about to be enqueued.
    ///
    /// Returns `false` if the batch must be dropped because it holds a negative value for a measure consumed by a sum,
    /// count, or distribution view.
    pub fn validate_batch(&self, measurements: &[Measurement]) -> bool {
        let rejecting = self.negative_value_measures.load();
        let offending = measurements
            .iter()
            .find(|m| m.value() < 0.0 && rejecting.contains(m.measure().name()));

        let Some(offending) = offending else {
            return true;
        };

        self.record_negative_value_drop(offending, measurements.len());
        false
    }

    fn record_negative_value_drop(&self, offending: &Measurement, batch_size: usize) {
        self.telemetry.increment_dropped(DropReason::NegativeValue);
        let drops = self.negative_value_drops.fetch_add(1, Ordering::Relaxed);
        if drops % NEGATIVE_VALUE_WARN_EVERY == 0 {
            warn!(
                measure = offending.measure().name(),
                value = offending.value(),
                batch_size,
                total_dropped = drops + 1,
                "Dropping recorded batch: values for sum, count, and distribution views must be non-negative."
            );
        }
    }

    /// Applies a recorded batch. Called only from the recording worker.
    pub fn apply(&self, entry: RecordEntry) {
        let mut registry = self.lock_registry();
        if !self.is_enabled() {
            self.telemetry.increment_dropped(DropReason::CollectionDisabled);
            return;
        }

        // Views registered after the batch was validated may reject values that were accepted at the time.
        let offending = entry
            .measurements
            .iter()
            .find(|m| m.value() < 0.0 && registry.rejects_negative_values(m.measure().name()));
        if let Some(offending) = offending {
            self.record_negative_value_drop(offending, entry.measurements.len());
            return;
        }

        registry.record(&entry.tags, &entry.measurements, &entry.attachments, entry.timestamp);
        self.telemetry.increment_batches_recorded();
    }

    pub fn register_view(&self, view: View) -> Result<Registration, RegistrationError> {
        let now = self.clock.now();
        let mut registry = self.lock_registry();
        let registration = registry.register_view(view, now)?;
        if registration == Registration::Registered {
            self.negative_value_measures
                .store(Arc::new(registry.measures_rejecting_negative_values()));
        }
        Ok(registration)
    }

    pub fn get_view(&self, name: &str) -> Option<ViewData> {
        let now = self.clock.now();
        let mut registry = self.lock_registry();
        if self.is_enabled() {
            registry.snapshot(name, now)
        } else {
            registry.view(name).cloned().map(ViewData::empty)
        }
    }

    fn set_state(&self, state: CollectionState) -> bool {
        let enable = state == CollectionState::Enabled;
        let now = self.clock.now();

        let mut registry = self.lock_registry();
        if self.enabled.swap(enable, Ordering::AcqRel) == enable {
            return false;
        }

        if enable {
            registry.resume_stats_collection(now);
        } else {
            registry.clear_stats();
        }
        debug!(?state, "Changed stats collection state.");
        true
    }

    /// Translates the latest snapshot of every exportable view into metrics.
    pub fn metrics(&self) -> Vec<Metric> {
        let now = self.clock.now();
        let mut registry = self.lock_registry();
        if !self.is_enabled() {
            return Vec::new();
        }

        let views = registry.exportable_views();
        views
            .iter()
            .filter_map(|view| registry.snapshot(view.name().as_str(), now))
            .filter_map(|data| Metric::from_view_data(&data))
            .collect()
    }
}

/// An in-process stats aggregation engine.
///
/// The engine owns the view registry and a dedicated worker thread. Measurements recorded through a
/// [`StatsRecorder`] are queued and applied by that worker, so recording never contends with aggregation work and
/// every aggregator has a single writer.
///
/// Dropping the engine signals the worker to stop without waiting for it. Use [`shutdown`][Self::shutdown] to drain
/// pending measurements and wait for the worker to exit.
pub struct StatsEngine {
    shared: Arc<Shared>,
    recorder: StatsRecorder,
    worker: Option<JoinHandle<()>>,
}

impl StatsEngine {
    /// Creates a new `StatsEngine` using the system clock.
    ///
    /// # Errors
    ///
    /// If the recording worker thread cannot be spawned, an error is returned.
    pub fn from_configuration(config: &StatsConfiguration) -> Result<Self, EngineError> {
        Self::with_clock(config, SystemClock)
    }

    /// Creates a new `StatsEngine` using the given clock.
    ///
    /// Every window boundary and snapshot timestamp is derived from `clock`.
    ///
    /// # Errors
    ///
    /// If the recording worker thread cannot be spawned, an error is returned.
    pub fn with_clock<C>(config: &StatsConfiguration, clock: C) -> Result<Self, EngineError>
    where
        C: Clock + 'static,
    {
        let shared = Arc::new(Shared::new(config, Arc::new(clock), Telemetry::new()));
        let (sender, receiver) = mpsc::channel(config.queue_capacity().max(1));
        let worker = spawn_worker(Arc::clone(&shared), receiver)?;

        debug!(
            queue_capacity = config.queue_capacity(),
            interval_bucket_count = config.interval_bucket_count(),
            enabled = config.collection_enabled(),
            "Started stats engine."
        );

        Ok(Self {
            recorder: StatsRecorder::new(Arc::clone(&shared), sender),
            shared,
            worker: Some(worker),
        })
    }

    /// Returns a handle for recording measurements.
    ///
    /// Handles are cheap to clone and can be shared freely between threads.
    pub fn recorder(&self) -> StatsRecorder {
        self.recorder.clone()
    }

    /// Starts a new batch of measurements.
    ///
    /// This is a shorthand for `engine.recorder().new_measure_map()`.
    pub fn new_measure_map(&self) -> MeasureMap<'_> {
        self.recorder.new_measure_map()
    }

    /// Registers a view.
    ///
    /// Registering a view identical to one already registered succeeds without resetting its data.
    ///
    /// # Errors
    ///
    /// If a different view is registered under the same name, or a different measure is registered under the name of
    /// the view's measure, an error is returned and the existing registration is left untouched.
    pub fn register_view(&self, view: View) -> Result<Registration, RegistrationError> {
        self.shared.register_view(view)
    }

    /// Returns a snapshot of the view with the given name, or `None` if no such view is registered.
    ///
    /// While collection is disabled, the snapshot is empty and its window timestamps are zero.
    pub fn get_view(&self, name: &str) -> Option<ViewData> {
        self.shared.get_view(name)
    }

    /// Returns every registered view with a cumulative window, ordered by name.
    pub fn exportable_views(&self) -> Vec<View> {
        self.shared.lock_registry().exportable_views().to_vec()
    }

    /// Returns the current collection state.
    pub fn state(&self) -> CollectionState {
        if self.shared.is_enabled() {
            CollectionState::Enabled
        } else {
            CollectionState::Disabled
        }
    }

    /// Sets the collection state.
    ///
    /// Disabling collection clears all aggregated data. Re-enabling it starts fresh cumulative windows and brings
    /// interval windows up to date. Returns `true` if the state changed.
    pub fn set_state(&self, state: CollectionState) -> bool {
        self.shared.set_state(state)
    }

    /// Blocks until every measurement recorded before this call has been aggregated.
    ///
    /// See [`StatsRecorder::flush`].
    pub fn flush(&self) {
        self.recorder.flush();
    }

    /// Returns a producer that exposes exportable views as metrics.
    pub fn metric_producer(&self) -> StatsMetricProducer {
        StatsMetricProducer::new(Arc::clone(&self.shared))
    }

    /// Aggregates every pending measurement, then stops the recording worker and waits for it to exit.
    ///
    /// Recorder handles that outlive the engine drop everything recorded through them afterwards.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            self.recorder.send_blocking(WorkItem::Shutdown);
            if worker.join().is_err() {
                error!("Stats recording worker panicked.");
            }
        }
    }
}

impl Drop for StatsEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.recorder.try_send_shutdown();
        }
    }
}
