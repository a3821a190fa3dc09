//! Coordinator state machine and read models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::agents::AgentStatus;
use crate::approval::EmergencyLevel;

/// Lifecycle state of the whole desk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    Initializing,
    Running,
    Paused,
    Stopping,
    Error,
}

impl SystemState {
    /// Allowed edges. `Error` is left only by re-initializing.
    pub fn can_transition_to(&self, next: SystemState) -> bool {
        use SystemState::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Initializing, Error)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Stopping)
                | (Paused, Stopping)
                | (Stopping, Initializing)
                | (Error, Initializing)
        )
    }

    /// Whether cycles and the reactive path may trade
    pub fn is_trading(&self) -> bool {
        matches!(self, SystemState::Running)
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemState::Initializing => write!(f, "INITIALIZING"),
            SystemState::Running => write!(f, "RUNNING"),
            SystemState::Paused => write!(f, "PAUSED"),
            SystemState::Stopping => write!(f, "STOPPING"),
            SystemState::Error => write!(f, "ERROR"),
        }
    }
}

/// Outcome of one daily cycle. Immutable once `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_id: Uuid,
    pub cycle_type: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub signals_generated: usize,
    pub trades_executed: usize,
    /// Last step that completed, 1 ..= 7
    pub steps_completed: u8,
}

impl CycleResult {
    pub fn daily() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            cycle_type: "DAILY".to_string(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            success: false,
            error_message: None,
            signals_generated: 0,
            trades_executed: 0,
            steps_completed: 0,
        }
    }

    pub(crate) fn finish(mut self, error: Option<String>) -> Self {
        let now = Utc::now();
        self.success = error.is_none();
        self.error_message = error;
        self.completed_at = Some(now);
        self.duration_ms = (now - self.started_at).num_milliseconds();
        self
    }
}

/// Read-only status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub state: SystemState,
    pub started_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleResult>,
    pub agents: BTreeMap<String, AgentStatus>,
    pub emergency_level: EmergencyLevel,
    pub circuit_breaker_triggered: bool,
    /// Most recent errors, oldest first
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use SystemState::*;
        assert!(Initializing.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Initializing));
        assert!(!Running.can_transition_to(Error));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Error.can_transition_to(Running));
        assert!(Error.can_transition_to(Initializing));
    }

    #[test]
    fn test_cycle_result_finish() {
        let ok = CycleResult::daily().finish(None);
        assert!(ok.success);
        assert!(ok.completed_at.is_some());
        assert!(ok.duration_ms >= 0);

        let failed = CycleResult::daily().finish(Some("broker down".to_string()));
        assert!(!failed.success);
        assert_eq!(failed.error_message.as_deref(), Some("broker down"));
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(serde_json::to_string(&SystemState::Running).unwrap(), "\"RUNNING\"");
        assert_eq!(SystemState::Paused.to_string(), "PAUSED");
    }
}
