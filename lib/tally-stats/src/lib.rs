//! In-process stats aggregation.
//!
//! Applications define [`Measure`]s, the quantities they record values for, and register [`View`]s, which describe
//! how recorded values are aggregated: which measure, which tag keys to break the data down by, which statistic to
//! compute, and over what time window. Values are recorded in batches against a [`TagContext`][tally_context::TagContext]
//! through a [`StatsRecorder`], and aggregated snapshots are pulled with [`StatsEngine::get_view`] or, in the shape a
//! metrics exporter expects, through a [`MetricProducer`].
//!
//! All aggregation happens on a single worker thread fed by a bounded queue. Recording threads only validate, timestamp,
//! and enqueue their batch, and never block: when the queue is full, the batch is dropped and counted.
//!
//! # Internal telemetry
//!
//! The engine reports on itself through the [`metrics`] facade:
//!
//! - `tally_stats_batches_dropped_total{reason}`: batches dropped because of a negative value, a full queue, disabled
//!   collection, or a stopped worker
//! - `tally_stats_batches_recorded_total`: batches applied by the worker
//! - `tally_stats_measurements_applied_total`: individual values folded into a view
//! - `tally_stats_clock_skew_total`: values recorded with a timestamp earlier than the newest interval bucket
//! - `tally_stats_registered_views`: number of registered views
//! - `tally_stats_queue_depth`: batches waiting in the queue
#![deny(warnings)]
#![deny(missing_docs)]

mod aggregation;
pub use self::aggregation::Aggregator;

mod config;
pub use self::config::{ConfigurationError, StatsConfiguration};

pub mod data;

mod engine;
pub use self::engine::{CollectionState, StatsEngine};

mod error;
pub use self::error::{EngineError, RegistrationError, ViewDefinitionError};

pub mod export;
pub use self::export::MetricProducer;

mod materializer;

mod measure;
pub use self::measure::{Measure, MeasureKind, Measurement, NAME_MAX_LENGTH};

mod recorder;
pub use self::recorder::{MeasureMap, StatsRecorder};

mod registry;
pub use self::registry::Registration;

mod telemetry;

pub mod time;

mod tuple;
pub use self::tuple::TagTuple;

mod view;
pub use self::view::{Aggregation, BucketBoundaries, View, ViewBuilder, ViewName, Window};
