//! Host loop for Tether processes.
//!
//! The relay and the client have no clock of their own. Each exposes
//! `tick(dt)` and trusts its host to call it steadily; [`TickScheduler`]
//! is that host for the binaries.
//!
//! Late wake-ups are never replayed as a burst of ticks. The missed time
//! is folded into the next tick's `dt` (capped by
//! [`TickConfig::max_step`]), so session timeouts keep pace with the wall
//! clock while the host catches its breath.
//!
//! ```ignore
//! let mut scheduler = TickScheduler::with_rate(100);
//! scheduler.run(&mut relay, tokio::signal::ctrl_c().map(|_| ())).await;
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as Deadline};
use tracing::{debug, trace, warn};

/// Anything driven by the host loop.
pub trait Tickable {
    fn tick(&mut self, dt: Duration);
}

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second. Clamped to `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    /// Largest `dt` a single tick may report after a stall.
    pub max_step: Duration,
    /// Fraction of the period a tick's work may use before it is logged.
    pub budget_warn_fraction: f64,
    /// Upper bound of a random delay before the first tick, so processes
    /// started together spread their sends.
    pub start_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 100,
            max_step: Duration::from_millis(250),
            budget_warn_fraction: 0.8,
            start_jitter: Duration::from_millis(2),
        }
    }
}

impl TickConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 1000;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Self::default()
        }
    }

    /// Brings every field into range. [`TickScheduler::new`] calls this.
    pub fn normalized(mut self) -> Self {
        let rate = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        if rate != self.tick_rate_hz {
            warn!(requested = self.tick_rate_hz, using = rate, "tick rate out of range");
            self.tick_rate_hz = rate;
        }
        if !(0.0..=1.0).contains(&self.budget_warn_fraction) {
            self.budget_warn_fraction = Self::default().budget_warn_fraction;
        }
        self.max_step = self.max_step.max(self.period());
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

/// One fired tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Starts at 1.
    pub number: u64,
    /// Logical time to advance: one period plus any missed ones, capped.
    pub dt: Duration,
    /// Whole periods that passed without a tick.
    pub missed: u32,
}

impl Tick {
    pub fn is_late(&self) -> bool {
        self.missed > 0
    }
}

/// Counters since the scheduler was created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub ticks: u64,
    pub late_ticks: u64,
    pub missed_periods: u64,
    /// Longest work span reported through [`TickScheduler::finish_tick`].
    pub slowest_work: Duration,
    pub mean_work: Duration,
    work_samples: u64,
}

pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    deadline: Deadline,
    count: u64,
    work_started: Option<Instant>,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.normalized();
        let period = config.period();
        let jitter = if config.start_jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::rng().random_range(Duration::ZERO..config.start_jitter)
        };
        debug!(
            rate_hz = config.tick_rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            "tick scheduler ready"
        );
        Self {
            deadline: Deadline::now() + period + jitter,
            config,
            period,
            count: 0,
            work_started: None,
            stats: TickStats::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Sleeps until the next deadline. The schedule keeps its phase:
    /// after a stall the following deadline is the next one still in the
    /// future, and the skipped periods show up in [`Tick::dt`].
    pub async fn next_tick(&mut self) -> Tick {
        time::sleep_until(self.deadline).await;
        let now = Deadline::now();

        let late_by = now.saturating_duration_since(self.deadline);
        let missed = u32::try_from(late_by.as_nanos() / self.period.as_nanos().max(1))
            .unwrap_or(u32::MAX);
        self.deadline += self.period.saturating_mul(missed.saturating_add(1));

        self.count += 1;
        self.work_started = Some(Instant::now());
        self.stats.ticks += 1;
        if missed > 0 {
            self.stats.late_ticks += 1;
            self.stats.missed_periods += u64::from(missed);
            warn!(tick = self.count, missed, "host loop fell behind");
        }

        let dt = self
            .period
            .saturating_mul(missed.saturating_add(1))
            .min(self.config.max_step);
        trace!(tick = self.count, ?dt, "tick");
        Tick {
            number: self.count,
            dt,
            missed,
        }
    }

    /// Marks the end of the current tick's work. Without a preceding
    /// [`next_tick`](Self::next_tick) this does nothing.
    pub fn finish_tick(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let work = started.elapsed();

        let stats = &mut self.stats;
        stats.work_samples += 1;
        stats.slowest_work = stats.slowest_work.max(work);
        let n = stats.work_samples as f64;
        stats.mean_work = Duration::from_secs_f64(
            stats.mean_work.as_secs_f64() + (work.as_secs_f64() - stats.mean_work.as_secs_f64()) / n,
        );

        let used = work.as_secs_f64() / self.period.as_secs_f64();
        if used >= self.config.budget_warn_fraction {
            warn!(
                tick = self.count,
                work_ms = work.as_secs_f64() * 1000.0,
                budget_pct = format!("{:.0}", used * 100.0),
                "tick work near or over its period"
            );
        }
    }

    /// Ticks `target` until `shutdown` resolves and returns how many
    /// ticks ran.
    pub async fn run<T, F>(&mut self, target: &mut T, shutdown: F) -> u64
    where
        T: Tickable + ?Sized,
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let mut ran = 0;
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                tick = self.next_tick() => {
                    target.tick(tick.dt);
                    self.finish_tick();
                    ran += 1;
                }
            }
        }
        debug!(ticks = ran, "host loop stopped");
        ran
    }

    pub fn tick_count(&self) -> u64 {
        self.count
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}
