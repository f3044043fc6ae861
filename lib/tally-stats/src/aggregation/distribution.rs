use tracing::debug;

use crate::{
    data::{Attachments, DistributionData, Exemplar},
    time::Timestamp,
    view::BucketBoundaries,
};

/// Largest difference from `1.0` at which a fraction still counts as a whole-bucket merge.
const WHOLE_FRACTION_TOLERANCE: f64 = 1e-6;

/// Running distribution state.
///
/// Mean and sum of squared deviations are maintained with Welford's online algorithm, and merged with the parallel
/// variant of the same, so that they stay numerically stable over long-lived windows.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Distribution {
    count: u64,
    mean: f64,
    sum_of_squared_deviations: f64,
    min: f64,
    max: f64,
    boundaries: BucketBoundaries,
    bucket_counts: Vec<u64>,
    exemplars: Vec<Option<Exemplar>>,
}

impl Distribution {
    pub fn new(boundaries: BucketBoundaries) -> Self {
        let buckets = boundaries.len() + 1;
        Self {
            count: 0,
            mean: 0.0,
            sum_of_squared_deviations: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            boundaries,
            bucket_counts: vec![0; buckets],
            exemplars: vec![None; buckets],
        }
    }

    pub fn add(&mut self, value: f64, attachments: &Attachments, timestamp: Timestamp) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.sum_of_squared_deviations += delta * (value - self.mean);

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let idx = self.boundaries.bucket_index(value);
        self.bucket_counts[idx] += 1;

        // A distribution without boundaries has a single bucket, and an exemplar for it would say nothing useful.
        if !attachments.is_empty() && !self.boundaries.is_empty() {
            self.exemplars[idx] = Some(Exemplar::new(value, timestamp, attachments.clone()));
        }
    }

    /// Merges `other` into this distribution.
    ///
    /// Only whole merges are supported: if `fraction` is not (approximately) `1.0`, this is a no-op. Histograms cannot
    /// be scaled without inventing where the remaining values fell.
    pub fn combine(&mut self, other: &Distribution, fraction: f64) {
        if (1.0 - fraction).abs() > WHOLE_FRACTION_TOLERANCE {
            debug!(fraction, "Skipping fractional distribution merge.");
            return;
        }

        if self.boundaries != other.boundaries {
            debug!(
                ours = ?self.boundaries.as_slice(),
                theirs = ?other.boundaries.as_slice(),
                "Skipping merge of distributions with different bucket boundaries."
            );
            return;
        }

        if other.count == 0 {
            return;
        }

        if self.count == 0 {
            self.clone_from(other);
            return;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        self.sum_of_squared_deviations += other.sum_of_squared_deviations
            + delta * delta * (self.count as f64) * (other.count as f64) / count as f64;
        self.mean = (self.mean * self.count as f64 + other.mean * other.count as f64) / count as f64;
        self.count = count;

        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        for (ours, theirs) in self.bucket_counts.iter_mut().zip(&other.bucket_counts) {
            *ours += theirs;
        }

        for (ours, theirs) in self.exemplars.iter_mut().zip(&other.exemplars) {
            if let Some(theirs) = theirs {
                let newer = match ours {
                    Some(ours) => theirs.timestamp() >= ours.timestamp(),
                    None => true,
                };
                if newer {
                    *ours = Some(theirs.clone());
                }
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn to_data(&self) -> DistributionData {
        DistributionData {
            count: self.count,
            mean: if self.count == 0 { 0.0 } else { self.mean },
            sum_of_squared_deviations: self.sum_of_squared_deviations,
            min: self.min,
            max: self.max,
            boundaries: self.boundaries.clone(),
            bucket_counts: self.bucket_counts.clone(),
            exemplars: self.exemplars.clone(),
        }
    }
}
