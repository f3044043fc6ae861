use std::time::Duration;

use snafu::Snafu;

/// An error describing why a measure or view definition is invalid.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum ViewDefinitionError {
    /// A name was empty, too long, or contained characters that are not printable ASCII.
    #[snafu(display(
        "Invalid {} name '{}': names must be 1 to {} printable ASCII characters.",
        kind,
        name,
        max_len
    ))]
    InvalidName {
        /// What was being named, such as `view` or `measure`.
        kind: &'static str,

        /// The rejected name.
        name: String,

        /// Maximum allowed length, in characters.
        max_len: usize,
    },

    /// A view listed the same tag key as a column more than once.
    #[snafu(display("View '{}' has duplicate column '{}'.", view, column))]
    DuplicateColumn {
        /// Name of the view.
        view: String,

        /// The duplicated tag key.
        column: String,
    },

    /// An interval window was given a zero duration.
    #[snafu(display("Interval window duration must be positive, got {:?}.", duration))]
    NonPositiveInterval {
        /// The rejected duration.
        duration: Duration,
    },

    /// Distribution bucket boundaries were not finite and strictly increasing.
    #[snafu(display("Bucket boundaries must be finite and strictly increasing: {:?}.", boundaries))]
    InvalidBucketBoundaries {
        /// The rejected boundaries.
        boundaries: Vec<f64>,
    },
}

/// An error returned when registering a view would conflict with an existing registration.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum RegistrationError {
    /// A different view is already registered with the same name.
    #[snafu(display("A different view with the same name is already registered: '{}'.", name))]
    ConflictingView {
        /// Name of the view.
        name: String,
    },

    /// A different measure is already bound to the same name.
    #[snafu(display("A different measure with the same name is already registered: '{}'.", name))]
    ConflictingMeasure {
        /// Name of the measure.
        name: String,
    },
}

/// An error returned when the stats engine cannot be started.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum EngineError {
    /// The recording worker thread could not be spawned.
    #[snafu(display("Failed to spawn stats recording worker thread."))]
    SpawnWorker {
        /// Error source.
        source: std::io::Error,
    },
}
