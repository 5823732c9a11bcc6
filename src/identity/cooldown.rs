use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::error::SessionError;

/// Per-actor throttle for interactive triggers.
/// Each actor holds an explicit expiry timestamp.
pub struct CooldownTracker {
    period: Duration,
    expiries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new(period: std::time::Duration) -> Self {
        Self {
            period: Duration::from_std(period).unwrap_or_else(|_| Duration::seconds(10)),
            expiries: Mutex::new(HashMap::new()),
        }
    }

    /// Succeeds and arms the cooldown unless the actor is still cooling down
    pub fn try_acquire(&self, actor: &str, now: DateTime<Utc>) -> Result<(), SessionError> {
        let mut expiries = self.expiries.lock();

        if let Some(expiry) = expiries.get(actor) {
            if now < *expiry {
                let remaining = *expiry - now;
                debug!("Actor {} throttled for {}ms", actor, remaining.num_milliseconds());
                return Err(SessionError::Cooldown {
                    remaining_secs: remaining.num_seconds().max(1),
                });
            }
        }

        expiries.insert(actor.to_string(), now + self.period);
        Ok(())
    }

    pub fn expiry(&self, actor: &str) -> Option<DateTime<Utc>> {
        self.expiries.lock().get(actor).copied()
    }

    /// Drop expired entries
    pub fn purge(&self, now: DateTime<Utc>) {
        self.expiries.lock().retain(|_, expiry| now < *expiry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_trigger_within_period_rejected() {
        let tracker = CooldownTracker::new(std::time::Duration::from_secs(10));
        let t0 = Utc::now();

        tracker.try_acquire("u1", t0).unwrap();
        let err = tracker.try_acquire("u1", t0 + Duration::seconds(3)).unwrap_err();
        assert_eq!(err, SessionError::Cooldown { remaining_secs: 7 });

        // other actors are unaffected
        tracker.try_acquire("u2", t0 + Duration::seconds(3)).unwrap();
    }

    #[test]
    fn test_trigger_after_expiry_allowed() {
        let tracker = CooldownTracker::new(std::time::Duration::from_secs(10));
        let t0 = Utc::now();

        tracker.try_acquire("u1", t0).unwrap();
        tracker.try_acquire("u1", t0 + Duration::seconds(10)).unwrap();
        assert_eq!(tracker.expiry("u1"), Some(t0 + Duration::seconds(20)));
    }

    #[test]
    fn test_rejected_trigger_does_not_extend() {
        let tracker = CooldownTracker::new(std::time::Duration::from_secs(10));
        let t0 = Utc::now();

        tracker.try_acquire("u1", t0).unwrap();
        let _ = tracker.try_acquire("u1", t0 + Duration::seconds(5));
        assert_eq!(tracker.expiry("u1"), Some(t0 + Duration::seconds(10)));
    }

    #[test]
    fn test_purge() {
        let tracker = CooldownTracker::new(std::time::Duration::from_secs(10));
        let t0 = Utc::now();
        tracker.try_acquire("u1", t0).unwrap();

        tracker.purge(t0 + Duration::seconds(11));
        assert_eq!(tracker.expiry("u1"), None);
    }
}
