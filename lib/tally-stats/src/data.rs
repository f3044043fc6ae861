//! Aggregated snapshots.
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    time::Timestamp,
    tuple::TagTuple,
    view::{BucketBoundaries, View, Window},
};

/// Contextual key/value pairs attached to a recorded batch of measurements.
pub type Attachments = Arc<BTreeMap<String, String>>;

/// A raw sample retained as a representative of a distribution bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct Exemplar {
    value: f64,
    timestamp: Timestamp,
    attachments: Attachments,
}

impl Exemplar {
    pub(crate) fn new(value: f64, timestamp: Timestamp, attachments: Attachments) -> Self {
        Self {
            value,
            timestamp,
            attachments,
        }
    }

    /// Returns the sampled value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Returns the time the sample was recorded.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the attachments the sample was recorded with.
    pub fn attachments(&self) -> &BTreeMap<String, String> {
        &self.attachments
    }
}

/// Snapshot of a distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionData {
    pub(crate) count: u64,
    pub(crate) mean: f64,
    pub(crate) sum_of_squared_deviations: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) boundaries: BucketBoundaries,
    pub(crate) bucket_counts: Vec<u64>,
    pub(crate) exemplars: Vec<Option<Exemplar>>,
}

impl DistributionData {
    /// Returns the number of values in the distribution.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the arithmetic mean of the values in the distribution.
    ///
    /// This is zero when the distribution is empty: check [`count`][Self::count] first.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Returns the sum of the values in the distribution.
    pub fn sum(&self) -> f64 {
        self.mean * self.count as f64
    }

    /// Returns the sum of squared deviations from the mean.
    pub fn sum_of_squared_deviations(&self) -> f64 {
        self.sum_of_squared_deviations
    }

    /// Returns the minimum value in the distribution, or `None` if it is empty.
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Returns the maximum value in the distribution, or `None` if it is empty.
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Returns the bucket boundaries of the distribution.
    pub fn boundaries(&self) -> &BucketBoundaries {
        &self.boundaries
    }

    /// Returns the number of values in each bucket.
    ///
    /// There is always one more bucket than there are boundaries.
    pub fn bucket_counts(&self) -> &[u64] {
        &self.bucket_counts
    }

    /// Returns the exemplar for each bucket, if one was recorded.
    pub fn exemplars(&self) -> &[Option<Exemplar>] {
        &self.exemplars
    }
}

/// Snapshot of one aggregator.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregationData {
    /// Sum over a floating-point measure.
    SumDouble(f64),

    /// Sum over an integer measure.
    SumLong(i64),

    /// Number of recorded values.
    Count(u64),

    /// Mean of recorded values.
    Mean {
        /// Arithmetic mean, or zero when `count` is zero.
        mean: f64,

        /// Number of recorded values.
        count: u64,
    },

    /// Distribution of recorded values.
    Distribution(DistributionData),

    /// Last value recorded for a floating-point measure.
    ///
    /// This is NaN if nothing has been recorded.
    LastValueDouble(f64),

    /// Last value recorded for an integer measure.
    LastValueLong(i64),
}

impl AggregationData {
    /// Returns the number of values that contributed to this data, where that is tracked.
    ///
    /// Sums and last values do not track a count, and return `None`.
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(count) | Self::Mean { count, .. } => Some(*count),
            Self::Distribution(data) => Some(data.count),
            Self::SumDouble(_) | Self::SumLong(_) | Self::LastValueDouble(_) | Self::LastValueLong(_) => None,
        }
    }

    /// Returns the data as a single floating-point value, where that makes sense.
    ///
    /// Distributions return `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SumDouble(v) | Self::LastValueDouble(v) => Some(*v),
            Self::SumLong(v) | Self::LastValueLong(v) => Some(*v as f64),
            Self::Count(count) => Some(*count as f64),
            Self::Mean { mean, .. } => Some(*mean),
            Self::Distribution(_) => None,
        }
    }
}

/// The time span covered by a view snapshot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowData {
    /// A cumulative snapshot covers everything from `start` to `end`.
    Cumulative {
        /// Start of the cumulative window.
        start: Timestamp,

        /// Time of the snapshot.
        end: Timestamp,
    },

    /// An interval snapshot covers the view's interval duration ending at `end`.
    Interval {
        /// Time of the snapshot.
        end: Timestamp,
    },
}

/// Snapshot of all aggregated data for one view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewData {
    view: View,
    data: BTreeMap<TagTuple, AggregationData>,
    window: WindowData,
}

impl ViewData {
    pub(crate) fn new(view: View, data: BTreeMap<TagTuple, AggregationData>, window: WindowData) -> Self {
        Self { view, data, window }
    }

    /// Creates an empty snapshot with zero timestamps, as returned while collection is disabled.
    pub(crate) fn empty(view: View) -> Self {
        let window = match view.window() {
            Window::Cumulative => WindowData::Cumulative {
                start: Timestamp::ZERO,
                end: Timestamp::ZERO,
            },
            Window::Interval(_) => WindowData::Interval { end: Timestamp::ZERO },
        };
        Self::new(view, BTreeMap::new(), window)
    }

    /// Returns the view this data was aggregated for.
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Returns the aggregated data, keyed by tag tuple.
    pub fn data(&self) -> &BTreeMap<TagTuple, AggregationData> {
        &self.data
    }

    /// Returns the aggregated data for a single tag tuple.
    pub fn get(&self, tuple: &TagTuple) -> Option<&AggregationData> {
        self.data.get(tuple)
    }

    /// Returns the time span covered by this snapshot.
    pub fn window(&self) -> WindowData {
        self.window
    }

    /// Consumes the snapshot, returning the aggregated data.
    pub fn into_data(self) -> BTreeMap<TagTuple, AggregationData> {
        self.data
    }
}
