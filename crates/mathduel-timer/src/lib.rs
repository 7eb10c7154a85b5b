//! Time primitives for mathduel rooms.
//!
//! - [`unix_millis`]: wall-clock timestamps for snapshots, driven by Tokio's
//!   clock so paused-time tests see the same time the timers see.
//! - [`Deadline`]: a cancellable one-shot timer owned by a room actor
//!   (auto-finish).
//! - [`SweepScheduler`]: a fixed-period ticker with a jittered first tick
//!   (heartbeat sweep).
//!
//! # Integration
//!
//! Both timers are designed to sit inside a `tokio::select!` loop. An
//! unarmed [`Deadline`] pends forever, so the branch is simply never taken:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         cmd = cmd_rx.recv() => { /* handle commands */ }
//!         () = deadline.wait() => { /* finish the game */ }
//!     }
//! }
//! ```

use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock reading taken once, paired with the Tokio instant it was taken at.
static ANCHOR: OnceLock<(u64, Instant)> = OnceLock::new();

/// Current time in unix milliseconds.
///
/// The system clock is read once; after that the value advances with
/// [`tokio::time::Instant`]. Under `tokio::time::pause` the result moves
/// only when the test clock does, which keeps `last_seen` arithmetic and
/// timer deadlines in agreement.
pub fn unix_millis() -> u64 {
    let (epoch_ms, at) = *ANCHOR.get_or_init(|| {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(as_millis)
            .unwrap_or(0);
        (epoch_ms, Instant::now())
    });
    epoch_ms.saturating_add(as_millis(Instant::now().saturating_duration_since(at)))
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// A cancellable one-shot timer.
///
/// [`Deadline::wait`] resolves once the armed instant passes and disarms
/// itself. Re-arming replaces the previous instant; disarming cancels it.
/// A deadline that was never armed (or was disarmed) pends forever.
#[derive(Debug, Default)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Creates an unarmed deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the deadline to fire `after` from now, replacing any pending one.
    pub fn arm(&mut self, after: Duration) {
        let at = Instant::now() + after;
        trace!(after_ms = as_millis(after), "deadline armed");
        self.at = Some(at);
    }

    /// Cancels the pending fire, if any.
    pub fn disarm(&mut self) {
        if self.at.take().is_some() {
            trace!("deadline disarmed");
        }
    }

    /// Returns `true` while a fire is pending.
    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Time left until the fire, or `None` when unarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Waits for the armed instant, then disarms.
    ///
    /// Cancel-safe: if the future is dropped before it resolves (another
    /// `select!` branch won), the deadline stays armed.
    pub async fn wait(&mut self) {
        let Some(at) = self.at else {
            std::future::pending::<()>().await;
            return;
        };
        time::sleep_until(at).await;
        self.at = None;
    }
}

// ---------------------------------------------------------------------------
// Sweep scheduler
// ---------------------------------------------------------------------------

/// Configuration for a [`SweepScheduler`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps. Must be non-zero.
    pub period: Duration,
    /// Upper bound of the random delay added to the first sweep, so
    /// several processes started together do not sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(4),
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl SweepConfig {
    /// A config with the given period and the default jitter.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }
}

/// Information about one sweep tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepInfo {
    /// Monotonically increasing sweep number (starts at 1).
    pub sweep: u64,
    /// Wall-clock time of the tick in unix millis.
    pub now_ms: u64,
}

/// Fixed-period ticker for the heartbeat sweep.
///
/// Missed ticks are skipped rather than bursted: a sweep that runs long
/// delays the next one instead of queuing several back to back.
pub struct SweepScheduler {
    interval: Interval,
    period: Duration,
    count: u64,
}

impl SweepScheduler {
    /// Creates a scheduler. The first tick fires after one period plus a
    /// random jitter in `0..initial_jitter`.
    pub fn new(config: SweepConfig) -> Self {
        let period = config.period.max(Duration::from_millis(1));
        let jitter = if config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = as_millis(config.initial_jitter);
            Duration::from_millis(rand::rng().random_range(0..max.max(1)))
        };

        let mut interval = time::interval_at(Instant::now() + period + jitter, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(
            period_ms = as_millis(period),
            jitter_ms = as_millis(jitter),
            "sweep scheduler created"
        );

        Self {
            interval,
            period,
            count: 0,
        }
    }

    /// Waits for the next sweep.
    pub async fn tick(&mut self) -> SweepInfo {
        self.interval.tick().await;
        self.count += 1;
        trace!(sweep = self.count, "sweep tick");
        SweepInfo {
            sweep: self.count,
            now_ms: unix_millis(),
        }
    }

    /// The period between sweeps.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of sweeps fired so far.
    pub fn sweep_count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sweep_config() {
        let cfg = SweepConfig::default();
        assert_eq!(cfg.period, Duration::from_secs(4));
        assert!(cfg.initial_jitter < cfg.period);
    }

    #[test]
    fn test_as_millis_saturates() {
        assert_eq!(as_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(as_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_new_deadline_is_unarmed() {
        let d = Deadline::new();
        assert!(!d.is_armed());
        assert_eq!(d.remaining(), None);
    }
}
