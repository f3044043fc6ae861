//! Recording pipeline.
//!
//! Application threads submit batches of measurements through a [`StatsRecorder`]. Each batch is validated and
//! timestamped on the calling thread, then pushed onto a bounded queue. A single worker thread pops batches in order
//! and applies them to the view registry, which makes it the only writer of aggregated state.
use std::{collections::BTreeMap, sync::Arc, thread};

use snafu::ResultExt as _;
use tally_context::TagContext;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, trace};

use crate::{
    data::Attachments,
    engine::Shared,
    error::{EngineError, SpawnWorker},
    measure::Measurement,
    telemetry::DropReason,
    time::Timestamp,
};

mod measure_map;
pub use self::measure_map::MeasureMap;

/// A batch of measurements waiting to be applied.
pub(crate) struct RecordEntry {
    pub tags: TagContext,
    pub measurements: Vec<Measurement>,
    pub attachments: Attachments,
    pub timestamp: Timestamp,
}

pub(crate) enum WorkItem {
    Record(RecordEntry),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// A handle for recording measurements.
///
/// Recording never blocks and never fails: batches are dropped, and counted, when collection is disabled, when they
/// contain invalid values, or when the queue is full.
#[derive(Clone)]
pub struct StatsRecorder {
    shared: Arc<Shared>,
    sender: mpsc::Sender<WorkItem>,
}

impl StatsRecorder {
    pub(crate) fn new(shared: Arc<Shared>, sender: mpsc::Sender<WorkItem>) -> Self {
        Self { shared, sender }
    }

    /// Starts a new batch of measurements.
    pub fn new_measure_map(&self) -> MeasureMap<'_> {
        MeasureMap::new(self)
    }

    pub(crate) fn submit(
        &self, tags: &TagContext, measurements: Vec<Measurement>, attachments: BTreeMap<String, String>,
    ) {
        if measurements.is_empty() || !self.shared.validate_batch(&measurements) {
            return;
        }

        let telemetry = self.shared.telemetry();
        if !self.shared.is_enabled() {
            telemetry.increment_dropped(DropReason::CollectionDisabled);
            return;
        }

        let entry = RecordEntry {
            tags: tags.clone(),
            measurements,
            attachments: Arc::new(attachments),
            timestamp: self.shared.clock().now(),
        };

        match self.sender.try_send(WorkItem::Record(entry)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => telemetry.increment_dropped(DropReason::QueueFull),
            Err(TrySendError::Closed(_)) => telemetry.increment_dropped(DropReason::WorkerStopped),
        }
    }

    /// Blocks until every measurement recorded before this call has been aggregated.
    ///
    /// Unlike recording, this waits for room in the queue when it is full. Returns immediately if the engine has been
    /// shut down.
    ///
    /// # Panics
    ///
    /// This must not be called from within an asynchronous runtime's worker thread, as it blocks.
    pub fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send_blocking(WorkItem::Flush(done_tx)) {
            // An error only means the worker stopped before reaching the flush, so there is nothing left to wait for.
            let _ = done_rx.blocking_recv();
        }
    }

    pub(crate) fn send_blocking(&self, item: WorkItem) -> bool {
        self.sender.blocking_send(item).is_ok()
    }

    pub(crate) fn try_send_shutdown(&self) {
        if self.sender.try_send(WorkItem::Shutdown).is_err() {
            debug!("Unable to signal stats recording worker to stop. It will stop once every recorder is dropped.");
        }
    }
}

pub(crate) fn spawn_worker(
    shared: Arc<Shared>, receiver: mpsc::Receiver<WorkItem>,
) -> Result<thread::JoinHandle<()>, EngineError> {
    thread::Builder::new()
        .name("tally-stats-worker".to_string())
        .spawn(move || run_worker(shared, receiver))
        .context(SpawnWorker)
}

fn run_worker(shared: Arc<Shared>, mut receiver: mpsc::Receiver<WorkItem>) {
    debug!("Stats recording worker started.");

    while let Some(item) = receiver.blocking_recv() {
        match item {
            WorkItem::Record(entry) => {
                trace!(measurements = entry.measurements.len(), "Applying recorded batch.");
                shared.apply(entry);
            }
            WorkItem::Flush(done) => {
                let _ = done.send(());
            }
            WorkItem::Shutdown => break,
        }
        shared.telemetry().set_queue_depth(receiver.len());
    }

    debug!("Stats recording worker stopped.");
}
