//! Small building blocks shared by the mixing server and its clients.
//!
//! - [`PeriodTimer`]: deadline tracking for a fixed-period tick driven by an
//!   external poll loop.
//! - [`lock`]: the single-instance lock marker.
//! - [`chunks`]: fixed-size chunking of byte streams.

pub mod chunks;
pub mod lock;

use std::time::{Duration, Instant};

/// Tracks the deadline of a periodic action without owning a thread.
///
/// The owner asks how long it may sleep with [`time_until_deadline`](Self::time_until_deadline),
/// then calls [`poll_expired`](Self::poll_expired) once it wakes up.
///
/// ```ignore
/// let mut timer = PeriodTimer::new(Duration::from_millis(2), Instant::now());
///
/// loop {
///     wait_for_events(timer.time_until_deadline(Instant::now()));
///
///     if timer.poll_expired(Instant::now()) > 0 {
///         tick();
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PeriodTimer {
    period: Duration,
    deadline: Instant,
    // invariant: period is non-zero
}

impl PeriodTimer {
    /// Creates a timer whose first deadline is one period after `now`.
    ///
    /// # Panics
    ///
    /// If `period` is zero.
    #[inline(always)]
    pub fn new(period: Duration, now: Instant) -> Self {
        assert!(!period.is_zero(), "ERROR: zero timer period");

        Self {
            period,
            deadline: now + period,
        }
    }

    #[inline(always)]
    pub const fn period(&self) -> Duration {
        self.period
    }

    #[inline(always)]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns how long is left before the next deadline, zero if it has passed.
    #[inline(always)]
    pub fn time_until_deadline(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    /// Returns the number of deadlines crossed at `now`, and schedules the next
    /// deadline strictly after `now`.
    ///
    /// Returns `0` (and leaves the deadline untouched) if the deadline hasn't been
    /// reached yet.
    pub fn poll_expired(&mut self, now: Instant) -> u32 {
        if now < self.deadline {
            return 0;
        }

        let late = now.duration_since(self.deadline);
        let missed = late.as_nanos() / self.period.as_nanos();
        let crossed = missed.strict_add(1);

        self.deadline += self
            .period
            .saturating_mul(u32::try_from(crossed).unwrap_or(u32::MAX));

        u32::try_from(crossed).unwrap_or(u32::MAX)
    }

    /// Restarts the timer so that the next deadline is one period after `now`.
    #[inline(always)]
    pub fn reset(&mut self, now: Instant) {
        self.deadline = now + self.period;
    }
}
