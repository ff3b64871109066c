//! Exponential reconnection backoff.
//!
//! Delay for attempt `n` (1-based) is `min(base * 2^(n-1), cap)`. The
//! counter grows on every failure and is reset on every successful open.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            attempt: 0,
        }
    }

    /// Failures since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Record one more failure and return how long to wait before retrying.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        delay_for(self.base, self.cap, self.attempt)
    }
}

pub fn delay_for(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1);
    let factor = 2u32.checked_pow(exp).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |d| d.min(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(1000);
    const CAP: Duration = Duration::from_millis(30_000);

    #[test]
    fn doubles_until_cap() {
        let mut b = Backoff::new(BASE, CAP);
        let got: Vec<u64> = (0..7).map(|_| b.next_delay().as_millis() as u64).collect();
        assert_eq!(got, vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000]);
        assert_eq!(b.attempt(), 7);
    }

    #[test]
    fn reset_starts_over() {
        let mut b = Backoff::new(BASE, CAP);
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.attempt(), 0);
        assert_eq!(b.next_delay(), BASE);
    }

    #[test]
    fn huge_attempts_saturate_at_cap() {
        assert_eq!(delay_for(BASE, CAP, 40), CAP);
        assert_eq!(delay_for(BASE, CAP, u32::MAX), CAP);
    }
}
