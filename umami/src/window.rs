use time::OffsetDateTime;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Absolute reporting period in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_at: i64,
    pub end_at: i64,
}

impl TimeWindow {
    /// Length of the window in milliseconds.
    #[must_use]
    pub const fn duration_millis(&self) -> i64 {
        self.end_at - self.start_at
    }
}

/// Turns a relative "days back" count into an absolute [`TimeWindow`].
///
/// By default the window ends at the current wall-clock time. A resolver
/// created with [`TimeWindowResolver::anchored_at`] always ends at the given
/// instant instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindowResolver {
    anchor: Option<OffsetDateTime>,
}

impl TimeWindowResolver {
    #[must_use]
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    /// Resolver whose windows end at `now` instead of the wall clock.
    #[must_use]
    pub const fn anchored_at(now: OffsetDateTime) -> Self {
        Self { anchor: Some(now) }
    }

    /// Resolves `days_back` days ending now.
    ///
    /// `days_back` is not validated; zero yields an empty window.
    #[must_use]
    pub fn resolve(&self, days_back: u32) -> TimeWindow {
        let now = self.anchor.unwrap_or_else(OffsetDateTime::now_utc);
        let end_at = unix_millis(now);
        let start_at = end_at - i64::from(days_back) * MILLIS_PER_DAY;
        TimeWindow { start_at, end_at }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}
