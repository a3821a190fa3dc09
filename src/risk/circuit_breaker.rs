//! Loss circuit breaker
//!
//! A latch: once tripped it stays tripped until the cooldown has elapsed
//! AND someone explicitly resets it. Improving P&L never clears it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a reset attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BreakerReset {
    NotTriggered,
    Reset,
    CoolingDown { remaining_secs: i64 },
}

/// Serializable view of the breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub cooldown_minutes: i64,
    pub total_trips: u32,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    cooldown: Duration,
    triggered_at: Option<DateTime<Utc>>,
    reason: Option<String>,
    total_trips: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown_minutes: i64) -> Self {
        Self {
            cooldown: Duration::minutes(cooldown_minutes),
            triggered_at: None,
            reason: None,
            total_trips: 0,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered_at.is_some()
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    /// Trip the breaker. Returns false if it was already tripped.
    pub fn trip(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.is_triggered() {
            return false;
        }
        self.triggered_at = Some(now);
        self.reason = Some(reason.into());
        self.total_trips += 1;
        true
    }

    pub fn try_reset(&mut self, now: DateTime<Utc>) -> BreakerReset {
        let Some(triggered_at) = self.triggered_at else {
            return BreakerReset::NotTriggered;
        };

        let elapsed = now - triggered_at;
        if elapsed < self.cooldown {
            return BreakerReset::CoolingDown {
                remaining_secs: (self.cooldown - elapsed).num_seconds(),
            };
        }

        self.triggered_at = None;
        self.reason = None;
        BreakerReset::Reset
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            triggered: self.is_triggered(),
            triggered_at: self.triggered_at,
            reason: self.reason.clone(),
            cooldown_minutes: self.cooldown.num_minutes(),
            total_trips: self.total_trips,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_is_latched() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(60);
        assert!(breaker.trip("loss", now));
        assert!(!breaker.trip("loss again", now));
        assert_eq!(breaker.snapshot().total_trips, 1);
        assert_eq!(breaker.triggered_at(), Some(now));
    }

    #[test]
    fn test_reset_respects_cooldown() {
        let now = Utc::now();
        let mut breaker = CircuitBreaker::new(60);
        assert_eq!(breaker.try_reset(now), BreakerReset::NotTriggered);

        breaker.trip("loss", now);
        match breaker.try_reset(now + Duration::minutes(30)) {
            BreakerReset::CoolingDown { remaining_secs } => assert_eq!(remaining_secs, 1800),
            other => panic!("Expected CoolingDown, got {:?}", other),
        }
        assert!(breaker.is_triggered());

        assert_eq!(breaker.try_reset(now + Duration::minutes(60)), BreakerReset::Reset);
        assert!(!breaker.is_triggered());
    }
}
