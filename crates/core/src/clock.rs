use rand::Rng;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Source of time and the only place the decision loop suspends.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

/// Wall clock backed by `thread::sleep`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        thread::sleep(d);
    }
}

/// Simulated clock: `sleep` advances time instantly.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }

    pub fn advance(&self, d: Duration) {
        *self.now.lock().unwrap() += d;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// `secs` with +/-30% random jitter, never below 10ms.
pub fn jitter<R: Rng + ?Sized>(secs: f64, rng: &mut R) -> Duration {
    let spread = secs * 0.3;
    let actual = if spread > 0.0 {
        secs + rng.gen_range(-spread..spread)
    } else {
        secs
    };
    Duration::from_secs_f64(actual.max(0.01))
}

/// Seconds as a `Duration`, clamping negatives to zero.
pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_millis(1500));
        assert_eq!(clock.now() - start, Duration::from_millis(1500));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let d = jitter(1.0, &mut rng).as_secs_f64();
            assert!((0.7..1.3).contains(&d), "{}", d);
        }
        assert_eq!(jitter(0.0, &mut rng), Duration::from_millis(10));
    }
}
