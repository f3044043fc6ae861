use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use ahash::AHashMap;
use tracing::debug;

use crate::{
    aggregation::Aggregator,
    data::{Attachments, ViewData, WindowData},
    telemetry::Telemetry,
    time::{duration_to_nanos, Timestamp},
    tuple::TagTuple,
    view::View,
};

type Bucket = AHashMap<TagTuple, Aggregator>;

enum Refresh {
    /// The newest bucket still covers the given time.
    Current,

    /// New buckets were appended, and expired ones evicted.
    Shifted,

    /// The given time is earlier than the start of the newest bucket.
    ClockSkew,
}

/// Aggregates a sliding window of fixed duration ending at the time of each query.
///
/// The window is split into `N` buckets of equal duration, and `N + 1` buckets are retained, oldest first. The extra
/// bucket is the one sliding out of the window: at query time, it contributes in proportion to how much of it still
/// falls inside the window. Bucket boundaries are shared by every tag tuple of the view.
///
/// Bucket start times lie on a fixed grid, anchored to when the view was registered. Once the whole window has expired,
/// the grid is re-anchored so that the newest bucket starts at the time that expired it.
pub(crate) struct IntervalMaterializer {
    view: View,
    bucket_count: usize,
    bucket_duration: Duration,
    newest_start: Timestamp,
    buckets: VecDeque<Bucket>,
}

impl IntervalMaterializer {
    pub fn new(view: View, total_duration: Duration, bucket_count: usize, now: Timestamp) -> Self {
        let bucket_count = bucket_count.max(1);
        let divisor = u32::try_from(bucket_count).unwrap_or(u32::MAX);
        let bucket_duration = (total_duration / divisor).max(Duration::from_nanos(1));

        let mut buckets = VecDeque::with_capacity(bucket_count + 1);
        buckets.resize_with(bucket_count + 1, Bucket::new);

        Self {
            view,
            bucket_count,
            bucket_duration,
            newest_start: now,
            buckets,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    fn refresh(&mut self, now: Timestamp) -> Refresh {
        let Some(elapsed) = now.duration_since(self.newest_start) else {
            return Refresh::ClockSkew;
        };

        let bucket_nanos = self.bucket_duration.as_nanos();
        let pad = elapsed.as_nanos() / bucket_nanos;
        if pad == 0 {
            return Refresh::Current;
        }

        let retained = self.bucket_count as u128 + 1;
        if pad > retained {
            // The whole window has expired. Start over with fresh buckets, the newest of which starts at `now`.
            self.buckets.clear();
            self.buckets.resize_with(self.bucket_count + 1, Bucket::new);
            self.newest_start = now;
            return Refresh::Shifted;
        }

        for _ in 0..pad {
            self.buckets.push_back(Bucket::new());
        }
        while self.buckets.len() > self.bucket_count + 1 {
            self.buckets.pop_front();
        }

        let advance = i128::try_from(pad * bucket_nanos).unwrap_or(i128::MAX);
        let newest_start = i128::from(self.newest_start.as_nanos()).saturating_add(advance);
        self.newest_start = Timestamp::from_nanos(i64::try_from(newest_start).unwrap_or(i64::MAX));

        Refresh::Shifted
    }

    fn refresh_or_clamp(&mut self, now: Timestamp, telemetry: &Telemetry) {
        if let Refresh::ClockSkew = self.refresh(now) {
            debug!(
                view = %self.view.name(),
                now = %now,
                newest_bucket_start = %self.newest_start,
                "Timestamp earlier than the newest interval bucket. Clamping to the newest bucket."
            );
            telemetry.increment_clock_skew();
        }
    }

    pub fn record(
        &mut self, tuple: TagTuple, value: f64, attachments: &Attachments, timestamp: Timestamp, telemetry: &Telemetry,
    ) {
        self.refresh_or_clamp(timestamp, telemetry);

        let aggregation = self.view.aggregation();
        if let Some(newest) = self.buckets.back_mut() {
            newest
                .entry(tuple)
                .or_insert_with(|| Aggregator::new(aggregation))
                .add(value, attachments, timestamp);
        }
    }

    /// Fraction of the newest bucket that has elapsed at `now`, in `[0, 1]`.
    fn newest_fraction(&self, now: Timestamp) -> f64 {
        let elapsed = now.duration_since(self.newest_start).unwrap_or_default();
        (duration_to_nanos(elapsed) as f64 / duration_to_nanos(self.bucket_duration) as f64).clamp(0.0, 1.0)
    }

    pub fn snapshot(&mut self, now: Timestamp) -> ViewData {
        self.refresh(now);

        let oldest_fraction = 1.0 - self.newest_fraction(now);
        let aggregation = self.view.aggregation();

        let mut combined = BTreeMap::new();
        for (i, bucket) in self.buckets.iter().enumerate() {
            let fraction = if i == 0 { oldest_fraction } else { 1.0 };
            for (tuple, aggregator) in bucket {
                combined
                    .entry(tuple.clone())
                    .or_insert_with(|| Aggregator::new(aggregation))
                    .combine(aggregator, fraction);
            }
        }

        let kind = self.view.measure().kind();
        let data = combined
            .into_iter()
            .map(|(tuple, aggregator)| (tuple, aggregator.to_data(kind)))
            .collect();

        ViewData::new(self.view.clone(), data, WindowData::Interval { end: now })
    }

    /// Clears every bucket, keeping the bucket structure intact.
    pub fn clear_stats(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    pub fn resume_stats_collection(&mut self, now: Timestamp) {
        self.refresh(now);
    }

    #[cfg(test)]
    fn bucket_len(&self) -> usize {
        self.buckets.len()
    }
}
