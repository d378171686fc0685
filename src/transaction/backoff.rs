// ============================================================================
// Transaction Backoff
// ============================================================================
//
// Delay policy applied between transaction attempts. The runner only talks
// to the `Backoff` trait so tests can observe (or skip) the waits.
//
// ============================================================================

use crate::connection::config::BackoffSettings;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Delay policy between transaction attempts
#[async_trait]
pub trait Backoff: Send {
    /// Wait for the next interval and advance the curve.
    ///
    /// Returns the delay that was waited.
    async fn backoff_and_wait(&mut self) -> Duration;

    /// Jump straight to the maximum delay for the next wait.
    ///
    /// That wait is exactly the maximum delay: jitter is not applied once the
    /// base has reached the cap.
    fn reset_to_max(&mut self);

    /// Start the curve over.
    fn reset(&mut self);
}

/// Exponential backoff with random jitter
///
/// The first wait uses `initial_delay`; every wait multiplies the base by
/// `backoff_factor`, capped at `max_delay`. Jitter spreads each wait by up to
/// half of `jitter_factor` around the base, except at the cap, where the wait
/// is `max_delay` itself.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    settings: BackoffSettings,
    current_base: Duration,
}

impl ExponentialBackoff {
    pub fn new(settings: BackoffSettings) -> Self {
        Self {
            settings,
            current_base: Duration::ZERO,
        }
    }

    pub fn settings(&self) -> &BackoffSettings {
        &self.settings
    }

    /// Base delay the next wait will be derived from (zero before the first wait)
    pub fn current_base(&self) -> Duration {
        self.current_base
    }

    /// Compute the next delay and advance the curve without waiting.
    pub fn next_delay(&mut self) -> Duration {
        if self.current_base.is_zero() {
            self.current_base = self.settings.initial_delay;
        }

        let base = self.current_base;
        let delay = self.with_jitter(base);

        // Settings are not validated here, so `initial_delay` may exceed
        // `max_delay`; the cap wins.
        let grown = scale(base, self.settings.backoff_factor, self.settings.max_delay);
        self.current_base = grown
            .max(self.settings.initial_delay)
            .min(self.settings.max_delay);

        delay
    }

    fn with_jitter(&self, base: Duration) -> Duration {
        if self.settings.jitter_factor <= 0.0 || base >= self.settings.max_delay {
            return base.min(self.settings.max_delay);
        }

        let offset = rand::thread_rng().gen_range(-0.5..=0.5) * self.settings.jitter_factor;
        scale(base, 1.0 + offset, self.settings.max_delay).min(self.settings.max_delay)
    }
}

/// `duration * factor`, rounded to whole nanoseconds; saturates at `cap`.
fn scale(duration: Duration, factor: f64, cap: Duration) -> Duration {
    let nanos = (duration.as_nanos() as f64 * factor).round();
    if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 {
        return cap;
    }
    Duration::from_nanos(nanos.max(0.0) as u64)
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(BackoffSettings::default())
    }
}

#[async_trait]
impl Backoff for ExponentialBackoff {
    async fn backoff_and_wait(&mut self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }

    fn reset_to_max(&mut self) {
        self.current_base = self.settings.max_delay;
    }

    fn reset(&mut self) {
        self.current_base = Duration::ZERO;
    }
}
