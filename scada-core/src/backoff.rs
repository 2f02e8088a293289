//! Exponential backoff with jitter, used by the resilient-connect policy
//! and by the downstream Modbus reconnect policy.

use std::time::Duration;

use rand::Rng;

/// An exponential backoff generator: `base`, doubling each call, capped at
/// `max`, with `jitter` applied as a uniform `±jitter` fraction of the
/// computed delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new backoff generator.
    ///
    /// `jitter` is a fraction in `[0.0, 1.0)`; the resilient-connect
    /// default uses `0.1` (±10%).
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter,
            attempt: 0,
        }
    }

    /// The resilient-connect default: base 1s, doubling, capped at 30s,
    /// ±10% jitter.
    pub fn resilient_connect_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 0.1)
    }

    /// Reset the attempt counter, e.g. after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// How many times `next` has been called since creation or the last
    /// `reset`.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Compute the next delay and advance the internal attempt counter.
    /// This generator never terminates (`resilient_connect_default` is
    /// bounded by the caller's own `max_attempts` count, not by this
    /// iterator).
    pub fn next(&mut self) -> Duration {
        let exp = self.attempt.min(20); // avoid overflow in 1 << exp
        self.attempt += 1;
        let unjittered = self
            .base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max)
            .min(self.max);

        if self.jitter <= 0.0 {
            return unjittered;
        }
        let mut rng = rand::thread_rng();
        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        let millis = (unjittered.as_millis() as f64 * factor).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_caps() {
        let mut b = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.0);
        assert_eq!(b.next(), Duration::from_secs(1));
        assert_eq!(b.next(), Duration::from_secs(2));
        assert_eq!(b.next(), Duration::from_secs(4));
        for _ in 0..10 {
            b.next();
        }
        assert_eq!(b.next(), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let mut b = ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(10), 0.1);
        for _ in 0..50 {
            let d = b.next();
            assert!(d.as_millis() >= 9_000 && d.as_millis() <= 11_000);
        }
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut b = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.0);
        b.next();
        b.next();
        b.reset();
        assert_eq!(b.attempt(), 0);
        assert_eq!(b.next(), Duration::from_secs(1));
    }
}
