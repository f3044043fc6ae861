//! Aggregators.
//!
//! An aggregator folds the values recorded for one tag tuple of one view into a running statistic. Aggregators are
//! never shared between threads while being written: the recording pipeline applies every mutation from a single
//! worker thread.
use tracing::debug;

use crate::{
    data::{AggregationData, Attachments},
    measure::MeasureKind,
    time::Timestamp,
    view::Aggregation,
};

mod distribution;
use self::distribution::Distribution;

#[derive(Clone, Debug, PartialEq)]
enum State {
    Sum(f64),
    Count(u64),
    Mean { sum: f64, count: u64 },
    Distribution(Distribution),
    LastValue(Option<f64>),
}

/// Running state for one statistic.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregator {
    state: State,
}

impl Aggregator {
    /// Creates an empty aggregator for the given aggregation.
    pub fn new(aggregation: &Aggregation) -> Self {
        let state = match aggregation {
            Aggregation::Sum => State::Sum(0.0),
            Aggregation::Count => State::Count(0),
            Aggregation::Mean => State::Mean { sum: 0.0, count: 0 },
            Aggregation::Distribution(boundaries) => State::Distribution(Distribution::new(boundaries.clone())),
            Aggregation::LastValue => State::LastValue(None),
        };
        Self { state }
    }

    /// Folds a single value into the aggregator.
    ///
    /// `attachments` and `timestamp` are only used by distributions, to record exemplars.
    pub fn add(&mut self, value: f64, attachments: &Attachments, timestamp: Timestamp) {
        match &mut self.state {
            State::Sum(sum) => *sum += value,
            State::Count(count) => *count += 1,
            State::Mean { sum, count } => {
                *count += 1;
                *sum += value;
            }
            State::Distribution(dist) => dist.add(value, attachments, timestamp),
            State::LastValue(last) => *last = Some(value),
        }
    }

    /// Merges `other` into this aggregator, weighting its contribution by `fraction`.
    ///
    /// Sums, counts, and means scale the incoming totals by `fraction`, with counts rounded to the nearest integer.
    /// Distributions only merge when `fraction` is `1.0`. Last values ignore `fraction`, and take the value of `other` if
    /// it has ever been written, as `other` is always the chronologically later aggregator.
    ///
    /// Merging aggregators of different kinds is a no-op.
    pub fn combine(&mut self, other: &Aggregator, fraction: f64) {
        match (&mut self.state, &other.state) {
            (State::Sum(sum), State::Sum(theirs)) => *sum += fraction * theirs,
            (State::Count(count), State::Count(theirs)) => *count += scale_count(*theirs, fraction),
            (State::Mean { sum, count }, State::Mean { sum: their_sum, count: their_count }) => {
                *count += scale_count(*their_count, fraction);
                *sum += fraction * their_sum;
            }
            (State::Distribution(dist), State::Distribution(theirs)) => dist.combine(theirs, fraction),
            (State::LastValue(last), State::LastValue(theirs)) => {
                if theirs.is_some() {
                    *last = *theirs;
                }
            }
            (ours, theirs) => {
                debug!(ours = kind_name(ours), theirs = kind_name(theirs), "Skipping merge of mismatched aggregators.");
            }
        }
    }

    /// Returns the number of values folded into this aggregator, where that is tracked.
    pub fn count(&self) -> Option<u64> {
        match &self.state {
            State::Count(count) | State::Mean { count, .. } => Some(*count),
            State::Distribution(dist) => Some(dist.count()),
            State::Sum(_) | State::LastValue(_) => None,
        }
    }

    /// Takes a snapshot of the aggregator.
    ///
    /// Sums and last values over integer measures are rounded to the nearest integer, with halfway cases rounded away
    /// from zero.
    pub fn to_data(&self, kind: MeasureKind) -> AggregationData {
        match (&self.state, kind) {
            (State::Sum(sum), MeasureKind::Int64) => AggregationData::SumLong(round_to_i64(*sum)),
            (State::Sum(sum), MeasureKind::Float64) => AggregationData::SumDouble(*sum),
            (State::Count(count), _) => AggregationData::Count(*count),
            (State::Mean { sum, count }, _) => AggregationData::Mean {
                mean: if *count == 0 { 0.0 } else { sum / *count as f64 },
                count: *count,
            },
            (State::Distribution(dist), _) => AggregationData::Distribution(dist.to_data()),
            (State::LastValue(last), MeasureKind::Int64) => {
                AggregationData::LastValueLong(last.map(round_to_i64).unwrap_or_default())
            }
            (State::LastValue(last), MeasureKind::Float64) => AggregationData::LastValueDouble(last.unwrap_or(f64::NAN)),
        }
    }
}

fn kind_name(state: &State) -> &'static str {
    match state {
        State::Sum(_) => "sum",
        State::Count(_) => "count",
        State::Mean { .. } => "mean",
        State::Distribution(_) => "distribution",
        State::LastValue(_) => "last_value",
    }
}

fn scale_count(count: u64, fraction: f64) -> u64 {
    (count as f64 * fraction).round() as u64
}

fn round_to_i64(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use float_cmp::assert_approx_eq;
    use proptest::{collection::vec as arb_vec, prelude::*};

    use super::*;
    use crate::view::BucketBoundaries;

    fn aggregator_of(aggregation: &Aggregation, values: &[f64]) -> Aggregator {
        let mut aggregator = Aggregator::new(aggregation);
        for &value in values {
            aggregator.add(value, &Arc::default(), Timestamp::ZERO);
        }
        aggregator
    }

    fn all_aggregations() -> Vec<Aggregation> {
        vec![
            Aggregation::Sum,
            Aggregation::Count,
            Aggregation::Mean,
            Aggregation::Distribution(BucketBoundaries::new(vec![-10.0, 0.0, 10.0]).unwrap()),
            Aggregation::LastValue,
        ]
    }

    #[test]
    fn add() {
        let values = [1.1, 2.2, -4.0, 10.0];
        let cases = [
            (Aggregation::Sum, MeasureKind::Float64, AggregationData::SumDouble(1.1 + 2.2 - 4.0 + 10.0)),
            (Aggregation::Sum, MeasureKind::Int64, AggregationData::SumLong(9)),
            (Aggregation::Count, MeasureKind::Float64, AggregationData::Count(4)),
            (
                Aggregation::Mean,
                MeasureKind::Float64,
                AggregationData::Mean {
                    mean: (1.1 + 2.2 - 4.0 + 10.0) / 4.0,
                    count: 4,
                },
            ),
            (Aggregation::LastValue, MeasureKind::Float64, AggregationData::LastValueDouble(10.0)),
            (Aggregation::LastValue, MeasureKind::Int64, AggregationData::LastValueLong(10)),
        ];

        for (aggregation, kind, expected) in cases {
            let actual = aggregator_of(&aggregation, &values).to_data(kind);
            assert_eq!(actual, expected, "unexpected snapshot for {:?} over {:?}", aggregation, kind);
        }
    }

    #[test]
    fn empty_snapshots() {
        let cases = [
            (Aggregation::Sum, MeasureKind::Int64, Some(0.0)),
            (Aggregation::Count, MeasureKind::Int64, Some(0.0)),
            (Aggregation::Mean, MeasureKind::Float64, Some(0.0)),
            (Aggregation::LastValue, MeasureKind::Int64, Some(0.0)),
        ];
        for (aggregation, kind, expected) in cases {
            let data = Aggregator::new(&aggregation).to_data(kind);
            assert_eq!(data.as_f64(), expected, "unexpected empty snapshot for {:?}", aggregation);
        }

        let last = Aggregator::new(&Aggregation::LastValue).to_data(MeasureKind::Float64);
        assert!(last.as_f64().is_some_and(f64::is_nan));
    }

    #[test]
    fn integer_rounding() {
        let cases = [(&[0.5][..], 1), (&[-0.5][..], -1), (&[1.25, 1.2][..], 2), (&[2.5, -0.1][..], 2)];
        for (values, expected) in cases {
            let data = aggregator_of(&Aggregation::Sum, values).to_data(MeasureKind::Int64);
            assert_eq!(data, AggregationData::SumLong(expected), "unexpected rounding of {:?}", values);
        }
    }

    #[test]
    fn fractional_combine() {
        let mut sum = Aggregator::new(&Aggregation::Sum);
        sum.combine(&aggregator_of(&Aggregation::Sum, &[20.0, -1.0]), 0.6);
        sum.combine(&aggregator_of(&Aggregation::Sum, &[1.0]), 1.0);
        assert_approx_eq!(f64, sum.to_data(MeasureKind::Float64).as_f64().unwrap(), 12.4, epsilon = 1e-9);

        let mut count = Aggregator::new(&Aggregation::Count);
        count.combine(&aggregator_of(&Aggregation::Count, &[1.0, 2.0, 3.0]), 0.5);
        assert_eq!(count.to_data(MeasureKind::Int64), AggregationData::Count(2));

        let mut mean = Aggregator::new(&Aggregation::Mean);
        mean.combine(&aggregator_of(&Aggregation::Mean, &[4.0, 6.0]), 0.5);
        mean.combine(&aggregator_of(&Aggregation::Mean, &[10.0]), 1.0);
        assert_eq!(
            mean.to_data(MeasureKind::Float64),
            AggregationData::Mean {
                mean: 15.0 / 2.0,
                count: 2
            }
        );

        let mut last = aggregator_of(&Aggregation::LastValue, &[1.0]);
        last.combine(&aggregator_of(&Aggregation::LastValue, &[7.0]), 0.0);
        assert_eq!(last.to_data(MeasureKind::Float64), AggregationData::LastValueDouble(7.0));
        last.combine(&Aggregator::new(&Aggregation::LastValue), 1.0);
        assert_eq!(last.to_data(MeasureKind::Float64), AggregationData::LastValueDouble(7.0));
    }

    #[test]
    fn combine_mismatched_kinds() {
        let mut sum = aggregator_of(&Aggregation::Sum, &[3.0]);
        let before = sum.clone();
        sum.combine(&aggregator_of(&Aggregation::Count, &[1.0]), 1.0);
        assert_eq!(sum, before);
    }

    proptest! {
        #[test]
        fn property_test_sum_count_mean(values in arb_vec(0.0f64..1e6, 0..64)) {
            let expected_sum: f64 = values.iter().sum();

            let sum = aggregator_of(&Aggregation::Sum, &values).to_data(MeasureKind::Float64);
            prop_assert_eq!(sum, AggregationData::SumDouble(expected_sum));

            let count = aggregator_of(&Aggregation::Count, &values).to_data(MeasureKind::Float64);
            prop_assert_eq!(count, AggregationData::Count(values.len() as u64));

            let mean = aggregator_of(&Aggregation::Mean, &values).to_data(MeasureKind::Float64);
            let expected_mean = if values.is_empty() { 0.0 } else { expected_sum / values.len() as f64 };
            prop_assert_eq!(mean, AggregationData::Mean { mean: expected_mean, count: values.len() as u64 });
        }

        #[test]
        fn property_test_combine_with_empty(values in arb_vec(0.0f64..1e6, 0..32)) {
            for aggregation in all_aggregations() {
                let original = aggregator_of(&aggregation, &values);

                let mut merged = original.clone();
                merged.combine(&Aggregator::new(&aggregation), 1.0);
                prop_assert_eq!(&merged, &original);

                let mut cloned = Aggregator::new(&aggregation);
                cloned.combine(&original, 1.0);
                prop_assert_eq!(&cloned, &original);
            }
        }
    }
}
