//! Periodic timers for Packetforge.
//!
//! A timer does no work itself. Each time it fires it pushes a
//! [`Packet::Timer`](packetforge_dispatch::Packet::Timer) onto the
//! dispatch queue, so timer handling runs on the logic thread, in order
//! with network traffic, and never races the packet handler.
//!
//! ```ignore
//! let timers = TimerService::spawn(
//!     dispatcher.queue(),
//!     [TimerConfig::standard(TIMER_1_SEC), TimerConfig::every(42, Duration::from_millis(250))],
//! );
//! // ... later
//! timers.stop();
//! ```
//!
//! The scheduling itself lives in [`TimerScheduler`], which can also be
//! driven directly from a `tokio::select!` loop.

mod service;

pub use service::TimerService;

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Standard timers
// ---------------------------------------------------------------------------

/// Fires every 100 ms.
pub const TIMER_100_MSEC: u32 = 1;
/// Fires every 200 ms.
pub const TIMER_200_MSEC: u32 = 2;
/// Fires every 500 ms.
pub const TIMER_500_MSEC: u32 = 3;
/// Fires every second.
pub const TIMER_1_SEC: u32 = 4;
/// Fires every 2 seconds.
pub const TIMER_2_SEC: u32 = 5;
/// Fires every 5 seconds.
pub const TIMER_5_SEC: u32 = 6;
/// Fires every 10 seconds.
pub const TIMER_10_SEC: u32 = 7;

/// Period of a standard timer id, or `None` for application ids.
pub fn standard_period(timer_id: u32) -> Option<Duration> {
    let ms = match timer_id {
        TIMER_100_MSEC => 100,
        TIMER_200_MSEC => 200,
        TIMER_500_MSEC => 500,
        TIMER_1_SEC => 1_000,
        TIMER_2_SEC => 2_000,
        TIMER_5_SEC => 5_000,
        TIMER_10_SEC => 10_000,
        _ => return None,
    };
    Some(Duration::from_millis(ms))
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a timer fires late (the logic thread or the runtime
/// was busy).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimerPolicy {
    /// Fire once and schedule the next one a full period from now.
    #[default]
    Skip,
    /// Fire the missed periods back to back, at most `max_catchup` of
    /// them; anything beyond is skipped.
    CatchUp { max_catchup: u32 },
    /// Fire once and keep the initial cadence.
    Drop,
}

/// One periodic timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Carried by every `Timer` packet this timer produces.
    pub timer_id: u32,
    pub period: Duration,
    pub policy: TimerPolicy,
    /// Upper bound of a random delay added to the first fire, so timers
    /// registered together do not all fire on the same instant.
    pub initial_jitter: Duration,
}

impl TimerConfig {
    /// Shortest accepted period.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// A timer with the given id and period and no jitter.
    pub fn every(timer_id: u32, period: Duration) -> Self {
        Self {
            timer_id,
            period,
            policy: TimerPolicy::default(),
            initial_jitter: Duration::ZERO,
        }
    }

    /// One of the standard timers (`TIMER_100_MSEC` ..= `TIMER_10_SEC`).
    /// Unknown ids get a one second period.
    pub fn standard(timer_id: u32) -> Self {
        let period = standard_period(timer_id).unwrap_or_else(|| {
            warn!(timer_id, "not a standard timer id, using a 1s period");
            Duration::from_secs(1)
        });
        Self::every(timer_id, period)
    }

    /// All seven standard timers.
    pub fn standard_set() -> Vec<Self> {
        (TIMER_100_MSEC..=TIMER_10_SEC).map(Self::standard).collect()
    }

    pub fn with_policy(mut self, policy: TimerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// Clamp out-of-range values. Called by [`TimerScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                timer_id = self.timer_id,
                period_us = self.period.as_micros() as u64,
                "timer period below 1ms, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// One firing of a timer, returned by [`TimerScheduler::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFire {
    pub timer_id: u32,
    /// Starts at 1.
    pub count: u64,
    /// `true` if this fire came noticeably late.
    pub overrun: bool,
    /// Periods dropped because of the overrun.
    pub skipped: u64,
}

/// Counters for one timer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerMetrics {
    pub total_fires: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
}

/// Schedules the fires of one periodic timer.
#[derive(Debug)]
pub struct TimerScheduler {
    config: TimerConfig,
    next: Instant,
    count: u64,
    metrics: TimerMetrics,
}

impl TimerScheduler {
    pub fn new(config: TimerConfig) -> Self {
        let config = config.validated();
        let max_ns = u64::try_from(config.initial_jitter.as_nanos()).unwrap_or(u64::MAX);
        let jitter = if max_ns > 0 {
            Duration::from_nanos(rand::rng().random_range(0..max_ns))
        } else {
            Duration::ZERO
        };
        debug!(
            timer_id = config.timer_id,
            period_ms = config.period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "timer scheduled"
        );
        Self {
            next: Instant::now() + config.period + jitter,
            config,
            count: 0,
            metrics: TimerMetrics::default(),
        }
    }

    /// Waits until the timer is due.
    pub async fn wait(&mut self) -> TimerFire {
        let due = self.next;
        let period = self.config.period;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.count += 1;
        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > period / 10;
        let behind = (late_by.as_nanos() / period.as_nanos()) as u64;
        let mut skipped = 0;

        self.next = match self.config.policy {
            TimerPolicy::Skip => {
                skipped = behind;
                if overrun && behind > 0 {
                    warn!(timer_id = self.config.timer_id, skipped, "timer overrun, skipping ahead");
                }
                now + period
            }
            TimerPolicy::CatchUp { max_catchup } => {
                if behind > u64::from(max_catchup) {
                    skipped = behind - u64::from(max_catchup);
                    warn!(
                        timer_id = self.config.timer_id,
                        behind,
                        skipped,
                        "timer overrun, catch-up capped at {max_catchup}"
                    );
                    now + period
                } else {
                    due + period
                }
            }
            TimerPolicy::Drop => {
                skipped = behind;
                if overrun {
                    warn!(timer_id = self.config.timer_id, skipped, "timer overrun, keeping cadence");
                }
                // Next deadline strictly after now, on the initial grid.
                let ahead = period.as_nanos() * (u128::from(behind) + 1);
                u64::try_from(ahead)
                    .ok()
                    .and_then(|ns| due.checked_add(Duration::from_nanos(ns)))
                    .unwrap_or(now + period)
            }
        };

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += skipped;
        self.metrics.total_fires += 1;
        trace!(timer_id = self.config.timer_id, count = self.count, overrun, "timer fired");

        TimerFire {
            timer_id: self.config.timer_id,
            count: self.count,
            overrun,
            skipped,
        }
    }

    pub fn timer_id(&self) -> u32 {
        self.config.timer_id
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn metrics(&self) -> &TimerMetrics {
        &self.metrics
    }
}
