use std::collections::BTreeMap;

use tally_context::TagContext;

use super::StatsRecorder;
use crate::measure::{Measure, Measurement};

/// A batch of measurements recorded together.
///
/// Every measurement in a batch shares the same tag context, attachments, and timestamp. If any value in the batch is
/// negative and its measure feeds a sum, count, or distribution view, the whole batch is dropped.
#[must_use = "measurements are only recorded when `record` is called"]
pub struct MeasureMap<'a> {
    recorder: &'a StatsRecorder,
    measurements: Vec<Measurement>,
    attachments: BTreeMap<String, String>,
}

impl<'a> MeasureMap<'a> {
    pub(super) fn new(recorder: &'a StatsRecorder) -> Self {
        Self {
            recorder,
            measurements: Vec::new(),
            attachments: BTreeMap::new(),
        }
    }

    /// Adds a floating-point value for `measure`.
    pub fn put_f64(mut self, measure: &Measure, value: f64) -> Self {
        self.measurements.push(Measurement::new(measure.clone(), value));
        self
    }

    /// Adds an integer value for `measure`.
    pub fn put_i64(mut self, measure: &Measure, value: i64) -> Self {
        self.measurements.push(Measurement::new(measure.clone(), value as f64));
        self
    }

    /// Adds a contextual attachment, such as a trace ID, to the batch.
    ///
    /// Attachments are kept with distribution exemplars. Setting the same key twice keeps the last value.
    pub fn put_attachment<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// Returns the measurements added so far.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Records the batch against the given tag context.
    pub fn record(self, tags: &TagContext) {
        self.recorder.submit(tags, self.measurements, self.attachments);
    }
}
