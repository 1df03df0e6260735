use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::{ApiError, Result};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rolling-window bookkeeping, guarded by one mutex.
/// Invariant: reset_at == window_start + window_duration.
#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: DateTime<Utc>,
    reset_at: DateTime<Utc>,
}

/// Dual-mechanism admission control for outbound API calls
///
/// A token bucket smooths call spacing (steady rate plus burst) while an
/// independent rolling 24h counter enforces the hard daily ceiling. The
/// window rolls from first use rather than at midnight because that is
/// how the upstream accounts its quota, so local and remote counters
/// drift less.
///
/// One instance per process, shared by handle; `sync` exists precisely
/// because the local count still drifts after restarts or when other
/// tooling burns the same quota.
pub struct RateGovernor {
    limiter: DirectRateLimiter,
    /// Lock-free so count/remaining reads never block a concurrent wait
    daily_count: AtomicU64,
    max_daily: AtomicU64,
    window: Mutex<WindowState>,
    window_duration: Duration,
}

impl RateGovernor {
    /// Production governor with a 24h rolling window
    pub fn new(per_second: u32, burst: u32, max_daily: u64) -> Self {
        Self::with_window(per_second, burst, max_daily, Duration::hours(24))
    }

    /// Window duration is injectable so tests don't wait a day
    pub fn with_window(per_second: u32, burst: u32, max_daily: u64, window: Duration) -> Self {
        let rate = NonZeroU32::new(per_second.max(1)).expect("clamped to at least 1");
        let burst = NonZeroU32::new(burst.max(1)).expect("clamped to at least 1");
        let quota = Quota::per_second(rate).allow_burst(burst);

        let now = Utc::now();
        Self {
            limiter: RateLimiter::direct(quota),
            daily_count: AtomicU64::new(0),
            max_daily: AtomicU64::new(max_daily),
            window: Mutex::new(WindowState {
                window_start: now,
                reset_at: now + window,
            }),
            window_duration: window,
        }
    }

    /// Block until one call is admitted, or fail with `DailyLimitReached`
    /// when the rolling quota is spent. The daily check happens before the
    /// bucket wait so an exhausted quota fails fast instead of pacing.
    pub async fn wait(&self) -> Result<()> {
        self.roll_window_if_due();

        let count = self.daily_count.load(Ordering::SeqCst);
        let limit = self.max_daily.load(Ordering::SeqCst);
        if count >= limit {
            return Err(ApiError::DailyLimitReached { count, limit });
        }

        self.limiter.until_ready().await;
        self.daily_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Zero the counter and restart the window once reset_at passes.
    /// reset_at only ever moves forward here.
    fn roll_window_if_due(&self) {
        let mut window = self
            .window
            .lock()
            .expect("rate window lock should not be poisoned");

        let now = Utc::now();
        if now > window.reset_at {
            self.daily_count.store(0, Ordering::SeqCst);
            window.window_start = now;
            window.reset_at = now + self.window_duration;
            tracing::debug!("Daily quota window rolled, next reset at {}", window.reset_at);
        }
    }

    /// Overwrite local state from an authoritative snapshot. Subsequent
    /// waits increment from this baseline rather than from zero.
    pub fn sync(&self, count: u64, limit: u64, reset_at: DateTime<Utc>) {
        let mut window = self
            .window
            .lock()
            .expect("rate window lock should not be poisoned");

        self.daily_count.store(count, Ordering::SeqCst);
        self.max_daily.store(limit, Ordering::SeqCst);
        window.reset_at = reset_at;
        window.window_start = reset_at - self.window_duration;

        tracing::info!(
            "Quota synced from authoritative source: {}/{}, resets at {}",
            count,
            limit,
            reset_at
        );
    }

    pub fn daily_count(&self) -> u64 {
        self.daily_count.load(Ordering::SeqCst)
    }

    pub fn max_daily(&self) -> u64 {
        self.max_daily.load(Ordering::SeqCst)
    }

    /// Never goes negative, even if sync set count above limit
    pub fn remaining(&self) -> u64 {
        self.max_daily().saturating_sub(self.daily_count())
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.window
            .lock()
            .expect("rate window lock should not be poisoned")
            .reset_at
    }
}
