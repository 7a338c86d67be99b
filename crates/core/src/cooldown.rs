use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Last-use timestamps per ability.
pub struct AbilityCooldownTracker {
    clock: Arc<dyn Clock>,
    last_used: HashMap<String, Instant>,
}

impl AbilityCooldownTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, last_used: HashMap::new() }
    }

    /// Stamp the current time. An entry never moves backwards.
    pub fn record_use(&mut self, ability: &str) {
        let now = self.clock.now();
        self.last_used
            .entry(ability.to_string())
            .and_modify(|t| *t = (*t).max(now))
            .or_insert(now);
    }

    /// True if the ability was never used or `cooldown` has elapsed since.
    pub fn can_use(&self, ability: &str, cooldown: Duration) -> bool {
        match self.last_used.get(ability) {
            None => true,
            Some(&t) => self.clock.now().saturating_duration_since(t) >= cooldown,
        }
    }

    pub fn last_used(&self, ability: &str) -> Option<Instant> {
        self.last_used.get(ability).copied()
    }

    pub fn clear(&mut self) {
        self.last_used.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker() -> (AbilityCooldownTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (AbilityCooldownTracker::new(clock.clone()), clock)
    }

    #[test]
    fn test_unused_ability_is_ready() {
        let (tracker, _) = tracker();
        assert!(tracker.can_use("raptor_strike", Duration::from_secs(6)));
    }

    #[test]
    fn test_blocked_until_cooldown_elapses() {
        let (mut tracker, clock) = tracker();
        tracker.record_use("raptor_strike");
        assert!(!tracker.can_use("raptor_strike", Duration::from_secs(6)));
        clock.advance(Duration::from_millis(5999));
        assert!(!tracker.can_use("raptor_strike", Duration::from_secs(6)));
        clock.advance(Duration::from_millis(1));
        assert!(tracker.can_use("raptor_strike", Duration::from_secs(6)));
    }

    #[test]
    fn test_zero_cooldown_always_ready() {
        let (mut tracker, _) = tracker();
        tracker.record_use("auto_shot");
        assert!(tracker.can_use("auto_shot", Duration::ZERO));
    }

    #[test]
    fn test_entries_are_monotonic() {
        let (mut tracker, clock) = tracker();
        tracker.record_use("auto_shot");
        let first = tracker.last_used("auto_shot").unwrap();
        clock.advance(Duration::from_secs(2));
        tracker.record_use("auto_shot");
        assert!(tracker.last_used("auto_shot").unwrap() > first);
    }
}
