use figment::{error::Kind, providers::Env, Figment};
use serde::Deserialize;
use snafu::{ensure, Snafu};

const fn default_collection_enabled() -> bool {
    true
}

const fn default_queue_capacity() -> usize {
    8192
}

const fn default_interval_bucket_count() -> usize {
    4
}

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// A field had a value of the wrong type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Name of the invalid field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// A field had a value of the right type, but the value itself is not usable.
    #[snafu(display("Invalid value for field '{}': {}", field, reason))]
    Validation {
        /// Name of the invalid field.
        field: &'static str,

        /// Why the value was rejected.
        reason: &'static str,
    },

    /// Generic configuration error.
    #[snafu(display("Failed to load configuration."))]
    Generic {
        /// Error source.
        source: Box<figment::Error>,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: Box::new(e) },
        }
    }
}

/// Stats engine configuration.
///
/// Every field has a default, so an empty configuration source is valid.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StatsConfiguration {
    /// Whether stats collection starts out enabled.
    ///
    /// Collection can be toggled at runtime with [`StatsEngine::set_state`][crate::StatsEngine::set_state].
    ///
    /// Defaults to `true`.
    #[serde(rename = "stats_collection_enabled", default = "default_collection_enabled")]
    collection_enabled: bool,

    /// Maximum number of recorded batches waiting to be aggregated.
    ///
    /// When the queue is full, newly recorded batches are dropped rather than blocking the recording thread.
    ///
    /// Defaults to 8192.
    #[serde(rename = "stats_queue_capacity", default = "default_queue_capacity")]
    queue_capacity: usize,

    /// Number of buckets an interval window is divided into.
    ///
    /// One additional bucket is retained so that the bucket sliding out of the window can be partially counted. More
    /// buckets give a smoother window at the cost of slower snapshots.
    ///
    /// Defaults to 4.
    #[serde(rename = "stats_interval_bucket_count", default = "default_interval_bucket_count")]
    interval_bucket_count: usize,
}

impl StatsConfiguration {
    /// Creates a new `StatsConfiguration` with default values.
    pub const fn with_defaults() -> Self {
        Self {
            collection_enabled: default_collection_enabled(),
            queue_capacity: default_queue_capacity(),
            interval_bucket_count: default_interval_bucket_count(),
        }
    }

    /// Extracts the configuration from the given `Figment`.
    ///
    /// Applications that keep their settings in files compose the providers themselves and hand the result over here.
    ///
    /// # Errors
    ///
    /// If a field has the wrong type, or an invalid value, an error is returned.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigurationError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from environment variables with the given prefix.
    ///
    /// With a prefix of `APP_`, the queue capacity is read from `APP_STATS_QUEUE_CAPACITY`, and so on.
    ///
    /// # Errors
    ///
    /// If a field has the wrong type, or an invalid value, an error is returned.
    pub fn from_environment(prefix: &str) -> Result<Self, ConfigurationError> {
        Self::from_figment(&Figment::from(Env::prefixed(prefix)))
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        ensure!(
            self.queue_capacity > 0,
            Validation {
                field: "stats_queue_capacity",
                reason: "must be greater than zero",
            }
        );
        ensure!(
            self.interval_bucket_count > 0,
            Validation {
                field: "stats_interval_bucket_count",
                reason: "must be greater than zero",
            }
        );
        Ok(())
    }

    /// Sets whether stats collection starts out enabled.
    pub const fn with_collection_enabled(mut self, enabled: bool) -> Self {
        self.collection_enabled = enabled;
        self
    }

    /// Sets the maximum number of recorded batches waiting to be aggregated.
    ///
    /// Values below one are treated as one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the number of buckets an interval window is divided into.
    ///
    /// Values below one are treated as one.
    pub fn with_interval_bucket_count(mut self, count: usize) -> Self {
        self.interval_bucket_count = count.max(1);
        self
    }

    /// Returns whether stats collection starts out enabled.
    pub const fn collection_enabled(&self) -> bool {
        self.collection_enabled
    }

    /// Returns the maximum number of recorded batches waiting to be aggregated.
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Returns the number of buckets an interval window is divided into.
    pub const fn interval_bucket_count(&self) -> usize {
        self.interval_bucket_count
    }
}

impl Default for StatsConfiguration {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        providers::{Format as _, Yaml},
        Jail,
    };

    use super::*;

    #[test]
    fn defaults() {
        let config = StatsConfiguration::from_figment(&Figment::new()).unwrap();
        assert_eq!(config, StatsConfiguration::with_defaults());
        assert!(config.collection_enabled());
        assert_eq!(config.queue_capacity(), 8192);
        assert_eq!(config.interval_bucket_count(), 4);
    }

    #[test]
    fn from_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("TALLY_STATS_QUEUE_CAPACITY", "16");
            jail.set_env("TALLY_STATS_COLLECTION_ENABLED", "false");

            let config = StatsConfiguration::from_environment("TALLY_").unwrap();
            assert_eq!(config.queue_capacity(), 16);
            assert!(!config.collection_enabled());
            assert_eq!(config.interval_bucket_count(), 4);
            Ok(())
        });
    }

    #[test]
    fn layered_providers() {
        Jail::expect_with(|jail| {
            jail.set_env("TALLY_STATS_INTERVAL_BUCKET_COUNT", "8");

            let figment = Figment::from(Yaml::string("stats_queue_capacity: 128\nstats_interval_bucket_count: 6\n"))
                .admerge(Env::prefixed("TALLY_"));
            let config = StatsConfiguration::from_figment(&figment).unwrap();
            assert_eq!(config.queue_capacity(), 128);
            assert_eq!(config.interval_bucket_count(), 8);
            Ok(())
        });
    }

    #[test]
    fn invalid_values() {
        Jail::expect_with(|jail| {
            jail.set_env("TALLY_STATS_QUEUE_CAPACITY", "0");
            let err = StatsConfiguration::from_environment("TALLY_").unwrap_err();
            assert!(matches!(
                err,
                ConfigurationError::Validation {
                    field: "stats_queue_capacity",
                    ..
                }
            ));

            jail.set_env("TALLY_STATS_QUEUE_CAPACITY", "lots");
            let err = StatsConfiguration::from_environment("TALLY_").unwrap_err();
            assert!(
                matches!(err, ConfigurationError::InvalidFieldType { ref field, .. } if field == "stats_queue_capacity"),
                "unexpected error: {}",
                err
            );
            Ok(())
        });
    }
}
