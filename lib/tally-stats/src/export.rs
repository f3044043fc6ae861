//! Metrics export.
//!
//! Exporters pull metrics rather than views: each cumulative view's latest snapshot becomes one [`Metric`], with one
//! [`TimeSeries`] per tag tuple. Interval views are not exported.
use std::sync::Arc;

use crate::{
    data::{AggregationData, DistributionData, ViewData, WindowData},
    engine::Shared,
    measure::MeasureKind,
    time::Timestamp,
    view::{Aggregation, View, Window},
};

/// The type of a metric.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MetricType {
    /// A monotonically accumulating integer.
    CumulativeInt64,

    /// A monotonically accumulating floating-point value.
    CumulativeDouble,

    /// A cumulative distribution.
    CumulativeDistribution,

    /// An instantaneous integer.
    GaugeInt64,

    /// An instantaneous floating-point value.
    GaugeDouble,
}

impl MetricType {
    /// Returns `true` if time series of this type carry a start timestamp.
    pub fn is_cumulative(&self) -> bool {
        !matches!(self, Self::GaugeInt64 | Self::GaugeDouble)
    }
}

/// Describes a metric.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricDescriptor {
    /// Name of the metric, which is the name of the view it was derived from.
    pub name: String,

    /// Description of the metric.
    pub description: String,

    /// Unit of the metric's values.
    pub unit: String,

    /// Type of the metric.
    pub metric_type: MetricType,

    /// Label keys, in the same order as the values of every time series.
    pub label_keys: Vec<String>,
}

impl MetricDescriptor {
    /// Creates the descriptor for the metric derived from `view`.
    ///
    /// Returns `None` for views with an interval window, which are not exported.
    pub fn for_view(view: &View) -> Option<Self> {
        if view.window() != Window::Cumulative {
            return None;
        }

        let kind = view.measure().kind();
        let metric_type = match (view.aggregation(), kind) {
            (Aggregation::Sum, MeasureKind::Int64) => MetricType::CumulativeInt64,
            (Aggregation::Sum, MeasureKind::Float64) => MetricType::CumulativeDouble,
            (Aggregation::Count, _) => MetricType::CumulativeInt64,
            (Aggregation::Mean, _) => MetricType::CumulativeDouble,
            (Aggregation::Distribution(_), _) => MetricType::CumulativeDistribution,
            (Aggregation::LastValue, MeasureKind::Int64) => MetricType::GaugeInt64,
            (Aggregation::LastValue, MeasureKind::Float64) => MetricType::GaugeDouble,
        };

        Some(Self {
            name: view.name().to_string(),
            description: view.description().to_string(),
            unit: view.measure().unit().to_string(),
            metric_type,
            label_keys: view.columns().iter().map(|key| key.as_str().to_string()).collect(),
        })
    }
}

/// The value of a point.
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue {
    /// An integer value.
    Int64(i64),

    /// A floating-point value.
    Double(f64),

    /// A distribution.
    Distribution(DistributionData),
}

/// A value at a point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    /// The value.
    pub value: PointValue,

    /// When the value was observed.
    pub timestamp: Timestamp,
}

/// The points of a single combination of label values.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    /// Label values, in the order of the descriptor's label keys. `None` marks a label with no value.
    pub label_values: Vec<Option<String>>,

    /// Points, oldest first.
    pub points: Vec<Point>,

    /// Start of the accumulation period, for cumulative metrics.
    pub start_timestamp: Option<Timestamp>,
}

/// A metric and all of its time series.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// Describes the metric.
    pub descriptor: MetricDescriptor,

    /// Time series, one per combination of label values.
    pub time_series: Vec<TimeSeries>,
}

impl Metric {
    /// Translates a view snapshot into a metric.
    ///
    /// Returns `None` if the view is not exportable, or if the snapshot has no data.
    pub fn from_view_data(data: &ViewData) -> Option<Self> {
        let descriptor = MetricDescriptor::for_view(data.view())?;
        if data.data().is_empty() {
            return None;
        }

        let (start, end) = match data.window() {
            WindowData::Cumulative { start, end } => (start, end),
            WindowData::Interval { end } => (end, end),
        };
        let start_timestamp = descriptor.metric_type.is_cumulative().then_some(start);

        let time_series = data
            .data()
            .iter()
            .map(|(tuple, aggregation)| TimeSeries {
                label_values: tuple
                    .values()
                    .iter()
                    .map(|value| value.as_ref().map(|v| v.as_str().to_string()))
                    .collect(),
                points: vec![Point {
                    value: point_value(aggregation),
                    timestamp: end,
                }],
                start_timestamp,
            })
            .collect();

        Some(Self {
            descriptor,
            time_series,
        })
    }
}

fn point_value(data: &AggregationData) -> PointValue {
    match data {
        AggregationData::SumDouble(v) | AggregationData::LastValueDouble(v) => PointValue::Double(*v),
        AggregationData::SumLong(v) | AggregationData::LastValueLong(v) => PointValue::Int64(*v),
        AggregationData::Count(count) => PointValue::Int64(i64::try_from(*count).unwrap_or(i64::MAX)),
        AggregationData::Mean { mean, .. } => PointValue::Double(*mean),
        AggregationData::Distribution(dist) => PointValue::Distribution(dist.clone()),
    }
}

/// A source of metrics for an exporter to pull from.
pub trait MetricProducer {
    /// Returns the current value of every metric.
    fn metrics(&self) -> Vec<Metric>;
}

/// Produces metrics from the exportable views of a [`StatsEngine`][crate::StatsEngine].
///
/// While collection is disabled, no metrics are produced.
#[derive(Clone)]
pub struct StatsMetricProducer {
    shared: Arc<Shared>,
}

impl StatsMetricProducer {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl MetricProducer for StatsMetricProducer {
    fn metrics(&self) -> Vec<Metric> {
        self.shared.metrics()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use super::*;
    use crate::{measure::Measure, tuple::TagTuple};

    fn view(measure: &Measure, aggregation: Aggregation) -> View {
        View::builder("view", measure, aggregation)
            .description("A view.")
            .columns(["region", "host"])
            .build()
            .unwrap()
    }

    #[test]
    fn metric_types() {
        let int = Measure::int64("int", "", "1").unwrap();
        let float = Measure::float64("float", "", "ms").unwrap();
        let dist = Aggregation::distribution(vec![1.0]).unwrap();

        let cases = [
            (&int, Aggregation::Sum, MetricType::CumulativeInt64),
            (&float, Aggregation::Sum, MetricType::CumulativeDouble),
            (&float, Aggregation::Count, MetricType::CumulativeInt64),
            (&int, Aggregation::Mean, MetricType::CumulativeDouble),
            (&int, dist, MetricType::CumulativeDistribution),
            (&int, Aggregation::LastValue, MetricType::GaugeInt64),
            (&float, Aggregation::LastValue, MetricType::GaugeDouble),
        ];

        for (measure, aggregation, expected) in cases {
            let descriptor = MetricDescriptor::for_view(&view(measure, aggregation.clone())).unwrap();
            assert_eq!(
                descriptor.metric_type, expected,
                "unexpected type for {:?} over {:?}",
                aggregation, measure
            );
        }
    }

    #[test]
    fn interval_views_are_not_exported() {
        let measure = Measure::int64("int", "", "1").unwrap();
        let view = View::builder("interval", &measure, Aggregation::Sum)
            .window(Window::Interval(Duration::from_secs(60)))
            .build()
            .unwrap();
        assert!(MetricDescriptor::for_view(&view).is_none());

        let data = ViewData::new(view, BTreeMap::new(), WindowData::Interval { end: Timestamp::ZERO });
        assert!(Metric::from_view_data(&data).is_none());
    }

    #[test]
    fn time_series_per_tuple() {
        let measure = Measure::float64("latency", "", "ms").unwrap();
        let view = view(&measure, Aggregation::Sum);
        let data = ViewData::new(
            view,
            BTreeMap::from([
                (TagTuple::new([Some("us"), None]), AggregationData::SumDouble(1.5)),
                (TagTuple::new([Some("eu"), Some("web-1")]), AggregationData::SumDouble(2.0)),
            ]),
            WindowData::Cumulative {
                start: Timestamp::from_secs(10),
                end: Timestamp::from_secs(20),
            },
        );

        let metric = Metric::from_view_data(&data).unwrap();
        assert_eq!(metric.descriptor.name, "view");
        assert_eq!(metric.descriptor.unit, "ms");
        assert_eq!(metric.descriptor.label_keys, vec!["region", "host"]);
        assert_eq!(
            metric.time_series,
            vec![
                TimeSeries {
                    label_values: vec![Some("eu".to_string()), Some("web-1".to_string())],
                    points: vec![Point {
                        value: PointValue::Double(2.0),
                        timestamp: Timestamp::from_secs(20),
                    }],
                    start_timestamp: Some(Timestamp::from_secs(10)),
                },
                TimeSeries {
                    label_values: vec![Some("us".to_string()), None],
                    points: vec![Point {
                        value: PointValue::Double(1.5),
                        timestamp: Timestamp::from_secs(20),
                    }],
                    start_timestamp: Some(Timestamp::from_secs(10)),
                },
            ]
        );
    }

    #[test]
    fn gauges_have_no_start_timestamp() {
        let measure = Measure::int64("queue_size", "", "1").unwrap();
        let data = ViewData::new(
            view(&measure, Aggregation::LastValue),
            BTreeMap::from([(TagTuple::new([None::<&str>, None]), AggregationData::LastValueLong(7))]),
            WindowData::Cumulative {
                start: Timestamp::from_secs(1),
                end: Timestamp::from_secs(2),
            },
        );

        let metric = Metric::from_view_data(&data).unwrap();
        assert_eq!(metric.time_series[0].start_timestamp, None);
        assert_eq!(metric.time_series[0].points[0].value, PointValue::Int64(7));
    }

    #[test]
    fn empty_snapshots_produce_no_metric() {
        let measure = Measure::int64("int", "", "1").unwrap();
        let data = ViewData::empty(view(&measure, Aggregation::Count));
        assert!(Metric::from_view_data(&data).is_none());
    }
}
