use std::{num::NonZeroUsize, path::Path};

use anyhow::{bail, Context as _};
use figment::{
    providers::{Env, Format as _, Yaml},
    Figment,
};
use serde::Deserialize;
use tally_stats::{Aggregation, Measure, StatsConfiguration, View, Window};

/// Prefix for environment variables that override the stats engine settings.
const ENV_PREFIX: &str = "GRINDSTONE_";

/// Aggregation applied by a view.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationBlueprint {
    /// Sum of all recorded values.
    Sum,

    /// Number of recorded values.
    Count,

    /// Running mean of recorded values.
    Mean,

    /// Histogram with the given explicit bucket boundaries.
    Distribution(Vec<f64>),

    /// Most recently recorded value.
    LastValue,
}

impl AggregationBlueprint {
    fn to_aggregation(&self) -> Result<Aggregation, anyhow::Error> {
        Ok(match self {
            Self::Sum => Aggregation::Sum,
            Self::Count => Aggregation::Count,
            Self::Mean => Aggregation::Mean,
            Self::Distribution(boundaries) => {
                Aggregation::distribution(boundaries.clone()).context("Invalid distribution bucket boundaries.")?
            }
            Self::LastValue => Aggregation::LastValue,
        })
    }
}

/// A view to register before the producers start.
#[derive(Clone, Deserialize)]
pub struct ViewBlueprint {
    /// View name.
    pub name: String,

    /// Aggregation applied to the latency measure.
    pub aggregation: AggregationBlueprint,

    /// Tag keys to group by.
    ///
    /// Only `region` and `host` are ever set by the producers. Any other key is projected as a missing value.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Length of the sliding window, in seconds.
    ///
    /// When absent, the view is cumulative.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

impl ViewBlueprint {
    /// Builds the view for the given measure.
    ///
    /// # Errors
    ///
    /// If the blueprint describes an invalid view, an error is returned.
    pub fn build(&self, measure: &Measure) -> Result<View, anyhow::Error> {
        let window = match self.interval_secs {
            None => Window::Cumulative,
            Some(0) => bail!("View '{}' has a zero-length interval.", self.name),
            Some(secs) => Window::Interval(std::time::Duration::from_secs(secs)),
        };

        View::builder(self.name.as_str(), measure, self.aggregation.to_aggregation()?)
            .description(format!("grindstone view '{}'", self.name))
            .columns(self.columns.iter().map(String::as_str))
            .window(window)
            .build()
            .with_context(|| format!("Invalid definition for view '{}'.", self.name))
    }
}

/// Load generator configuration.
#[derive(Deserialize)]
pub struct Config {
    /// Seed for the producers' random number generators.
    ///
    /// Each producer derives its own generator from this seed and its index, so a given configuration always records
    /// the same batches.
    pub seed: [u8; 32],

    /// Number of producer threads.
    pub producers: NonZeroUsize,

    /// Number of batches each producer records.
    pub batches_per_producer: NonZeroUsize,

    /// Values for the `region` tag.
    pub regions: Vec<String>,

    /// Number of distinct `host` tag values per region.
    #[serde(default = "default_hosts_per_region")]
    pub hosts_per_region: NonZeroUsize,

    /// Upper bound (exclusive) for recorded latency values.
    #[serde(default = "default_max_value")]
    pub max_value: f64,

    /// Fraction of batches that carry a negative value and are expected to be dropped.
    #[serde(default)]
    pub negative_ratio: f64,

    /// Views to register.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub views: Vec<ViewBlueprint>,

    /// Stats engine settings.
    ///
    /// These are read from the same file, with `GRINDSTONE_`-prefixed environment variables taking precedence.
    #[serde(skip, default = "StatsConfiguration::with_defaults")]
    pub stats: StatsConfiguration,
}

const fn default_hosts_per_region() -> NonZeroUsize {
    match NonZeroUsize::new(4) {
        Some(n) => n,
        None => unreachable!(),
    }
}

const fn default_max_value() -> f64 {
    100.0
}

impl Config {
    /// Attempts to load a serialized `Config` from the given file path.
    ///
    /// # Errors
    ///
    /// If an error occurs while reading the file, deserializing the configuration data, or validating it, it will be
    /// returned.
    pub fn try_from_file<P>(config_path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        let config_path = config_path.as_ref();
        let config_file_raw = std::fs::read_to_string(config_path).context("Failed to read configuration file.")?;
        let mut config: Self = serde_yaml::from_str(&config_file_raw).context("Failed to parse configuration file.")?;
        config.stats = load_stats_configuration(config_path)?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.regions.is_empty() {
            bail!("At least one region must be configured.");
        }
        if !(self.max_value.is_finite() && self.max_value > 0.0) {
            bail!("`max_value` must be a positive, finite number.");
        }
        if !(0.0..=1.0).contains(&self.negative_ratio) {
            bail!("`negative_ratio` must be between 0.0 and 1.0.");
        }
        if self.views.is_empty() {
            bail!("At least one view must be configured.");
        }

        Ok(())
    }
}

fn load_stats_configuration(config_path: &Path) -> Result<StatsConfiguration, anyhow::Error> {
    let figment = Figment::from(Yaml::file(config_path)).admerge(Env::prefixed(ENV_PREFIX));
    StatsConfiguration::from_figment(&figment).context("Failed to load stats engine configuration.")
}
