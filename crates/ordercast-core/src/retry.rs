//! Reconnection backoff calculation.
//!
//! Sync-only math; the transport supplies the randomness and does the
//! sleeping.

use std::time::Duration;

/// Parameters of the transport's own reconnection loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// Maximum reconnection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Jitter factor 0.0–1.0.
    pub randomization_factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            randomization_factor: 0.5,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (zero-based).
    ///
    /// `random` must be in `[0.0, 1.0)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn delay(&self, attempt: u32, random: f64) -> Duration {
        Duration::from_millis(calculate_backoff_delay_with_random(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.randomization_factor,
            random,
        ))
    }
}

/// Exponential backoff with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random * 2 - 1) * jitter)`,
/// so a factor of 0.5 varies the delay by ±50%.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}
