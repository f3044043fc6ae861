//! Timestamps and clocks.
use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// A point in time, in nanoseconds relative to the Unix epoch.
///
/// Timestamps are signed so that window arithmetic (for example, "the start of a window ending now") never underflows,
/// even when the clock in use starts at or near zero.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The zero timestamp, which is the Unix epoch.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from nanoseconds since the Unix epoch.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a timestamp from seconds since the Unix epoch.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Returns the number of nanoseconds since the Unix epoch.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns this timestamp moved forward by `duration`, saturating at the maximum representable timestamp.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_to_nanos(duration)))
    }

    /// Returns this timestamp moved backward by `duration`, saturating at the minimum representable timestamp.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration_to_nanos(duration)))
    }

    /// Returns the amount of time elapsed from `earlier` to this timestamp.
    ///
    /// Returns `None` if `earlier` is actually later than this timestamp.
    pub fn duration_since(self, earlier: Timestamp) -> Option<Duration> {
        let delta = i128::from(self.0) - i128::from(earlier.0);
        u64::try_from(delta).ok().map(Duration::from_nanos)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}.{:09})", self.0.div_euclid(1_000_000_000), self.0.rem_euclid(1_000_000_000))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0.div_euclid(1_000_000_000), self.0.rem_euclid(1_000_000_000))
    }
}

pub(crate) fn duration_to_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// A clock backed by the system's real-time clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since_epoch) => Timestamp::ZERO.saturating_add(since_epoch),
            Err(e) => Timestamp::ZERO.saturating_sub(e.duration()),
        }
    }
}

/// A manually-driven clock.
///
/// Clones share the same underlying time, so a test can hold one handle while the engine holds another.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a new `ManualClock` set to the given time.
    pub fn new(now: Timestamp) -> Self {
        Self {
            nanos: Arc::new(AtomicI64::new(now.as_nanos())),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: Timestamp) {
        self.nanos.store(now.as_nanos(), Ordering::Release);
    }

    /// Moves the current time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.nanos.fetch_add(duration_to_nanos(duration), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}
