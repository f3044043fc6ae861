//! Views.
use std::{borrow::Borrow, fmt, sync::Arc, time::Duration};

use snafu::ensure;
use tally_context::TagKey;

use crate::{
    error::{DuplicateColumn, InvalidBucketBoundaries, NonPositiveInterval, ViewDefinitionError},
    measure::{validate_name, Measure},
};

/// The name of a view.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ViewName(Arc<str>);

impl ViewName {
    /// Creates a new `ViewName`.
    ///
    /// # Errors
    ///
    /// If the name is empty, longer than [`NAME_MAX_LENGTH`][crate::NAME_MAX_LENGTH], or contains characters which
    /// are not printable ASCII, an error is returned.
    pub fn new<S: AsRef<str>>(name: S) -> Result<Self, ViewDefinitionError> {
        let name = name.as_ref();
        validate_name("view", name)?;
        Ok(Self(Arc::from(name)))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ViewName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upper bounds of the buckets of a distribution.
///
/// A distribution with `n` boundaries has `n + 1` buckets: `(-inf, b0)`, `[b0, b1)`, ..., `[b(n-1), +inf)`.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketBoundaries(Arc<[f64]>);

impl Default for BucketBoundaries {
    fn default() -> Self {
        Self(Arc::from(Vec::new()))
    }
}

impl BucketBoundaries {
    /// Creates a new set of bucket boundaries.
    ///
    /// An empty set of boundaries is valid, and results in a single bucket.
    ///
    /// # Errors
    ///
    /// If any boundary is not finite, or the boundaries are not strictly increasing, an error is returned.
    pub fn new(boundaries: Vec<f64>) -> Result<Self, ViewDefinitionError> {
        let valid = boundaries.iter().all(|b| b.is_finite()) && boundaries.windows(2).all(|w| w[0] < w[1]);
        ensure!(valid, InvalidBucketBoundaries { boundaries });
        Ok(Self(boundaries.into()))
    }

    /// Returns the boundaries.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Returns the number of boundaries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no boundaries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the index of the bucket that `value` falls into.
    ///
    /// A value belongs to the first bucket whose upper boundary it is strictly less than, or to the final bucket if it
    /// is greater than or equal to every boundary.
    pub fn bucket_index(&self, value: f64) -> usize {
        self.0.iter().position(|&b| value < b).unwrap_or(self.0.len())
    }
}

/// The statistic a view computes.
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregation {
    /// Running total of recorded values.
    Sum,

    /// Number of recorded values.
    Count,

    /// Arithmetic mean of recorded values.
    Mean,

    /// Histogram of recorded values, along with their count, mean, sum of squared deviations, minimum, and maximum.
    Distribution(BucketBoundaries),

    /// Most recently recorded value.
    LastValue,
}

impl Aggregation {
    /// Creates a distribution aggregation with the given bucket boundaries.
    ///
    /// # Errors
    ///
    /// If the boundaries are invalid, an error is returned. See [`BucketBoundaries::new`].
    pub fn distribution(boundaries: Vec<f64>) -> Result<Self, ViewDefinitionError> {
        BucketBoundaries::new(boundaries).map(Self::Distribution)
    }

    /// Returns `true` if this aggregation cannot accept negative values.
    ///
    /// A batch of measurements containing a negative value for a measure that any such aggregation consumes is
    /// dropped entirely.
    pub fn rejects_negative_values(&self) -> bool {
        matches!(self, Self::Sum | Self::Count | Self::Distribution(_))
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Mean => "mean",
            Self::Distribution(_) => "distribution",
            Self::LastValue => "last_value",
        }
    }
}

/// The time window a view aggregates over.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Window {
    /// Everything recorded since the view was registered, or since collection was last resumed.
    #[default]
    Cumulative,

    /// Everything recorded within the given duration before the time of the query.
    Interval(Duration),
}

#[derive(Debug, PartialEq)]
struct Inner {
    name: ViewName,
    description: String,
    measure: Measure,
    aggregation: Aggregation,
    columns: Vec<TagKey>,
    window: Window,
}

/// An aggregation recipe over a measure.
///
/// A view describes which measure it consumes, which tag keys ("columns") its data is broken down by, which statistic
/// it computes, and over what time window. Views are immutable once built, and are cheap to clone.
#[derive(Clone, PartialEq)]
pub struct View {
    inner: Arc<Inner>,
}

impl View {
    /// Creates a builder for a view over `measure` that computes `aggregation`.
    pub fn builder<S: Into<String>>(name: S, measure: &Measure, aggregation: Aggregation) -> ViewBuilder {
        ViewBuilder {
            name: name.into(),
            description: String::new(),
            measure: measure.clone(),
            aggregation,
            columns: Vec::new(),
            window: Window::Cumulative,
        }
    }

    /// Returns the name of the view.
    pub fn name(&self) -> &ViewName {
        &self.inner.name
    }

    /// Returns the description of the view.
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// Returns the measure the view consumes.
    pub fn measure(&self) -> &Measure {
        &self.inner.measure
    }

    /// Returns the aggregation the view computes.
    pub fn aggregation(&self) -> &Aggregation {
        &self.inner.aggregation
    }

    /// Returns the tag keys the view's data is broken down by, in order.
    pub fn columns(&self) -> &[TagKey] {
        &self.inner.columns
    }

    /// Returns the window the view aggregates over.
    pub fn window(&self) -> Window {
        self.inner.window
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.inner.name)
            .field("measure", &self.inner.measure.name())
            .field("aggregation", &self.inner.aggregation)
            .field("columns", &self.inner.columns)
            .field("window", &self.inner.window)
            .finish()
    }
}

/// Builder for [`View`].
#[derive(Clone, Debug)]
pub struct ViewBuilder {
    name: String,
    description: String,
    measure: Measure,
    aggregation: Aggregation,
    columns: Vec<TagKey>,
    window: Window,
}

impl ViewBuilder {
    /// Sets the description of the view.
    ///
    /// Defaults to an empty string.
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the tag keys the view's data is broken down by.
    ///
    /// Defaults to no columns, which aggregates every recorded value together.
    pub fn columns<I, K>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TagKey>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the window of the view.
    ///
    /// Defaults to [`Window::Cumulative`].
    pub fn window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    /// Builds the view.
    ///
    /// # Errors
    ///
    /// If the name is invalid, a column is listed more than once, or an interval window has a zero duration, an error
    /// is returned.
    pub fn build(self) -> Result<View, ViewDefinitionError> {
        let name = ViewName::new(&self.name)?;

        for (i, column) in self.columns.iter().enumerate() {
            ensure!(
                !self.columns[..i].contains(column),
                DuplicateColumn {
                    view: self.name.as_str(),
                    column: column.as_str(),
                }
            );
        }

        if let Window::Interval(duration) = self.window {
            ensure!(!duration.is_zero(), NonPositiveInterval { duration });
        }

        Ok(View {
            inner: Arc::new(Inner {
                name,
                description: self.description,
                measure: self.measure,
                aggregation: self.aggregation,
                columns: self.columns,
                window: self.window,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latency() -> Measure {
        Measure::float64("latency", "Request latency", "ms").unwrap()
    }

    #[test]
    fn bucket_index() {
        let boundaries = BucketBoundaries::new(vec![0.0, 10.0, 100.0]).unwrap();
        let cases = [
            (-5.0, 0),
            (0.0, 1),
            (9.999, 1),
            (10.0, 2),
            (99.0, 2),
            (100.0, 3),
            (1e9, 3),
        ];

        for (value, expected) in cases {
            assert_eq!(boundaries.bucket_index(value), expected, "value {} in wrong bucket", value);
        }

        assert_eq!(BucketBoundaries::default().bucket_index(42.0), 0);
    }

    #[test]
    fn bucket_boundaries_validation() {
        assert!(BucketBoundaries::new(vec![]).is_ok());
        assert!(BucketBoundaries::new(vec![-1.0, 0.0, 1.5]).is_ok());
        assert!(BucketBoundaries::new(vec![1.0, 1.0]).is_err());
        assert!(BucketBoundaries::new(vec![2.0, 1.0]).is_err());
        assert!(BucketBoundaries::new(vec![0.0, f64::NAN]).is_err());
        assert!(BucketBoundaries::new(vec![0.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn build_rejects_duplicate_columns() {
        let result = View::builder("latency_by_method", &latency(), Aggregation::Mean)
            .columns(["method", "status", "method"])
            .build();

        assert_eq!(
            result.unwrap_err(),
            ViewDefinitionError::DuplicateColumn {
                view: "latency_by_method".to_string(),
                column: "method".to_string(),
            }
        );
    }

    #[test]
    fn build_rejects_zero_interval() {
        let result = View::builder("latency_1m", &latency(), Aggregation::Sum)
            .window(Window::Interval(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(ViewDefinitionError::NonPositiveInterval { .. })));
    }

    #[test]
    fn build_rejects_invalid_name() {
        let result = View::builder("", &latency(), Aggregation::Count).build();
        assert!(matches!(result, Err(ViewDefinitionError::InvalidName { kind: "view", .. })));
    }

    #[test]
    fn equality_is_by_definition() {
        let build = |description: &str| {
            View::builder("latency_dist", &latency(), Aggregation::distribution(vec![10.0, 20.0]).unwrap())
                .description(description)
                .columns(["method"])
                .build()
                .unwrap()
        };

        assert_eq!(build("a"), build("a"));
        assert_ne!(build("a"), build("b"));
    }

    #[test]
    fn negative_value_rejection() {
        assert!(Aggregation::Sum.rejects_negative_values());
        assert!(Aggregation::Count.rejects_negative_values());
        assert!(Aggregation::Distribution(BucketBoundaries::default()).rejects_negative_values());
        assert!(!Aggregation::Mean.rejects_negative_values());
        assert!(!Aggregation::LastValue.rejects_negative_values());
    }
}
