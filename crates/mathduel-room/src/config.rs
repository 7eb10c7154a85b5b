//! Coordinator configuration.

use std::time::Duration;

use mathduel_timer::SweepConfig;

/// Tunables for rooms, the heartbeat monitor, and room actors.
///
/// Every field has a production default; tests usually override one or
/// two with the `with_*` setters.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a game runs before it finishes on its own.
    pub room_duration: Duration,

    /// Problems generated at each start.
    pub problem_count: usize,

    /// Online members required for `start_game` to succeed.
    pub min_players_to_start: usize,

    /// Characters in a generated room code.
    pub room_code_len: usize,

    /// Period of the heartbeat sweep.
    pub heartbeat_interval: Duration,

    /// Staleness timeout for members on a continuous channel.
    pub channel_timeout: Duration,

    /// Staleness timeout applied by `room_status` pulls.
    pub poll_timeout: Duration,

    /// Capacity of each room actor's command channel.
    pub command_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            room_duration: Duration::from_secs(60),
            problem_count: 200,
            min_players_to_start: 2,
            room_code_len: 6,
            heartbeat_interval: Duration::from_secs(4),
            channel_timeout: Duration::from_secs(12),
            poll_timeout: Duration::from_secs(15),
            command_buffer: 64,
        }
    }
}

impl CoordinatorConfig {
    /// Sets the game length.
    pub fn with_room_duration(mut self, duration: Duration) -> Self {
        self.room_duration = duration;
        self
    }

    /// Sets how many problems each start generates.
    pub fn with_problem_count(mut self, count: usize) -> Self {
        self.problem_count = count;
        self
    }

    /// Sets the sweep period and the continuous-channel timeout.
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.channel_timeout = timeout;
        self
    }

    /// Clamps values that would make rooms unusable.
    ///
    /// Called by [`Coordinator::new`](crate::Coordinator::new):
    /// - `room_code_len` at least 4, so random codes rarely collide.
    /// - `command_buffer`, `min_players_to_start` and `problem_count` at
    ///   least 1, so a running room always has problems.
    pub fn validated(mut self) -> Self {
        if self.room_code_len < 4 {
            tracing::warn!(len = self.room_code_len, "room_code_len too short, using 4");
            self.room_code_len = 4;
        }
        self.command_buffer = self.command_buffer.max(1);
        self.min_players_to_start = self.min_players_to_start.max(1);
        self.problem_count = self.problem_count.max(1);
        self
    }

    /// Scheduler settings for the heartbeat monitor.
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::with_period(self.heartbeat_interval)
    }
}
