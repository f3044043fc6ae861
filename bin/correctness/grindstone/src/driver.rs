use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context as _};
use rand::{rngs::StdRng, Rng as _, SeedableRng as _};
use tally_context::TagContext;
use tally_stats::{
    data::AggregationData, export::MetricProducer as _, Aggregation, Measure, Registration, StatsEngine, StatsRecorder,
    Window,
};
use tracing::{debug, info, warn};

use crate::config::Config;

/// Work assigned to a single producer thread.
struct ProducerPlan {
    index: usize,
    seed: [u8; 32],
    batches: usize,
    contexts: Vec<TagContext>,
    max_value: f64,
    negative_ratio: f64,
    latency: Measure,
}

impl ProducerPlan {
    fn run(self, recorder: StatsRecorder) -> ProducerStats {
        let mut rng = StdRng::from_seed(self.seed);
        let producer = self.index.to_string();
        let mut stats = ProducerStats::default();

        for _ in 0..self.batches {
            let tags = &self.contexts[rng.random_range(0..self.contexts.len())];
            let mut value = rng.random_range(0.0..self.max_value);
            if rng.random_bool(self.negative_ratio) {
                value = -value - 1.0;
                stats.negative += 1;
            }

            recorder
                .new_measure_map()
                .put_f64(&self.latency, value)
                .put_attachment("producer", producer.as_str())
                .record(tags);
            stats.recorded += 1;
        }

        debug!(producer = self.index, batches = stats.recorded, "Producer finished.");
        stats
    }
}

#[derive(Default)]
struct ProducerStats {
    recorded: u64,
    negative: u64,
}

impl ProducerStats {
    fn merge(&mut self, other: ProducerStats) {
        self.recorded += other.recorded;
        self.negative += other.negative;
    }
}

pub struct Driver {
    config: Config,
    engine: StatsEngine,
    latency: Measure,
}

impl Driver {
    /// Creates a new `Driver` from the given configuration.
    ///
    /// The stats engine is started and every configured view is registered.
    ///
    /// # Errors
    ///
    /// If the engine cannot be started, or a view cannot be built or registered, an error is returned.
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        let engine = StatsEngine::from_configuration(&config.stats).context("Failed to start stats engine.")?;
        let latency = Measure::float64("grindstone/latency", "Synthetic request latency", "ms")
            .context("Failed to create latency measure.")?;

        for blueprint in &config.views {
            let view = blueprint.build(&latency)?;
            match engine.register_view(view)? {
                Registration::Registered => debug!(view = %blueprint.name, "Registered view."),
                Registration::AlreadyRegistered => {
                    warn!(view = %blueprint.name, "View listed more than once. Ignoring duplicate.")
                }
            }
        }

        Ok(Self {
            config,
            engine,
            latency,
        })
    }

    /// Runs the load generator to completion.
    ///
    /// # Errors
    ///
    /// If a producer thread cannot be spawned, or panics, an error is returned.
    pub fn run(self) -> Result<(), anyhow::Error> {
        let contexts = self.build_contexts();
        let producers = self.config.producers.get();
        let batches = self.config.batches_per_producer.get();

        info!(
            producers,
            batches_per_producer = batches,
            tag_sets = contexts.len(),
            views = self.config.views.len(),
            "Starting producers."
        );

        let started = Instant::now();
        let mut handles = Vec::with_capacity(producers);
        for index in 0..producers {
            let plan = ProducerPlan {
                index,
                seed: derive_seed(&self.config.seed, index),
                batches,
                contexts: contexts.clone(),
                max_value: self.config.max_value,
                negative_ratio: self.config.negative_ratio,
                latency: self.latency.clone(),
            };
            let recorder = self.engine.recorder();
            let handle = thread::Builder::new()
                .name(format!("grindstone-producer-{}", index))
                .spawn(move || plan.run(recorder))
                .context("Failed to spawn producer thread.")?;
            handles.push(handle);
        }

        let mut totals = ProducerStats::default();
        for handle in handles {
            match handle.join() {
                Ok(stats) => totals.merge(stats),
                Err(_) => bail!("Producer thread panicked."),
            }
        }
        let produced = started.elapsed();

        self.engine.flush();
        let drained = started.elapsed();

        info!(
            batches = totals.recorded,
            negative = totals.negative,
            produce_elapsed = ?produced,
            drain_elapsed = ?drained,
            batches_per_sec = rate(totals.recorded, drained),
            "Producers finished and queue drained."
        );

        self.check_counts(totals.recorded - totals.negative);
        self.report();

        self.engine.shutdown();
        Ok(())
    }

    fn build_contexts(&self) -> Vec<TagContext> {
        let mut contexts = Vec::with_capacity(self.config.regions.len() * self.config.hosts_per_region.get());
        for region in &self.config.regions {
            for host in 0..self.config.hosts_per_region.get() {
                contexts.push(
                    TagContext::builder()
                        .put("region", region.as_str())
                        .put("host", format!("{}-{}", region, host))
                        .build(),
                );
            }
        }
        contexts
    }

    /// Compares the totals of every cumulative count view against the number of batches that should have been
    /// accepted.
    ///
    /// A shortfall means batches were dropped because the queue was full.
    fn check_counts(&self, accepted: u64) {
        for view in self.engine.exportable_views() {
            if !matches!(view.aggregation(), Aggregation::Count) || view.window() != Window::Cumulative {
                continue;
            }

            let Some(data) = self.engine.get_view(view.name().as_str()) else {
                continue;
            };
            let counted: u64 = data.data().values().filter_map(AggregationData::count).sum();
            if counted == accepted {
                info!(view = %view.name(), counted, "Count view matches accepted batches.");
            } else {
                warn!(
                    view = %view.name(),
                    counted,
                    accepted,
                    "Count view does not match accepted batches. Some batches were likely dropped on a full queue."
                );
            }
        }
    }

    fn report(&self) {
        for view in self.engine.exportable_views() {
            let Some(data) = self.engine.get_view(view.name().as_str()) else {
                continue;
            };

            info!(view = %view.name(), window = ?data.window(), rows = data.data().len(), "View snapshot.");
            for (tuple, value) in data.data() {
                info!(view = %view.name(), tags = %tuple, "{}", describe(value));
            }
        }

        let metrics = self.engine.metric_producer().metrics();
        let series: usize = metrics.iter().map(|metric| metric.time_series.len()).sum();
        info!(metrics = metrics.len(), series, "Exported cumulative views as metrics.");
    }
}

fn derive_seed(seed: &[u8; 32], index: usize) -> [u8; 32] {
    let mut derived = *seed;
    for (byte, index_byte) in derived.iter_mut().zip(index.to_le_bytes()) {
        *byte ^= index_byte;
    }
    derived
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        count as f64 / secs
    }
}

fn describe(value: &AggregationData) -> String {
    match value {
        AggregationData::SumDouble(sum) => format!("sum={:.3}", sum),
        AggregationData::SumLong(sum) => format!("sum={}", sum),
        AggregationData::Count(count) => format!("count={}", count),
        AggregationData::Mean { mean, count } => format!("mean={:.3} count={}", mean, count),
        AggregationData::Distribution(dist) => format!(
            "count={} mean={:.3} min={:?} max={:?} buckets={:?}",
            dist.count(),
            dist.mean(),
            dist.min(),
            dist.max(),
            dist.bucket_counts()
        ),
        AggregationData::LastValueDouble(last) => format!("last={:.3}", last),
        AggregationData::LastValueLong(last) => format!("last={}", last),
    }
}
