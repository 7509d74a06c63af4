//! Exponential backoff policy for reconnect scheduling

use std::time::Duration;

/// Configuration for the reconnect backoff policy
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// First delay handed out, and the value the delay resets to on success
    pub floor: Duration,
    /// Upper bound on the delay
    pub ceiling: Duration,
    /// Growth factor applied after each delay is handed out
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(2),
            ceiling: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Tracks the current reconnect delay between `floor` and `ceiling`.
///
/// `next_delay` returns the current delay and grows it for the following
/// call; `reset` drops it back to the floor after a confirmed connection.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = config.floor;
        Self { config, current }
    }

    /// Return the delay for the next attempt, then grow it, clamped to the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let grown = self.current.as_secs_f64() * self.config.multiplier;
        self.current = Duration::from_secs_f64(grown).min(self.config.ceiling);
        delay
    }

    /// Reset the delay to the floor (call after a successful connection).
    pub fn reset(&mut self) {
        self.current = self.config.floor;
    }

    /// The delay the next call to `next_delay` would hand out.
    pub fn current(&self) -> Duration {
        self.current
    }
}
