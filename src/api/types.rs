use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::{CycleResult, SystemState};
use crate::domain::{SignalDirection, TradeSignal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: SystemState,
    pub started_at: Option<DateTime<Utc>>,
    /// Success flag of the last daily cycle, if any ran
    pub last_cycle: Option<bool>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsResponse {
    pub signals: Vec<TradeSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleTriggerResponse {
    pub message: String,
    pub result: CycleResult,
}

#[derive(Debug, Deserialize)]
pub struct EmergencyStopQuery {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub symbol: String,
    pub direction: Option<SignalDirection>,
    pub strength: Option<f64>,
    pub reasoning: Option<String>,
    pub message: Option<String>,
}

impl AnalyzeResponse {
    pub fn from_signal(symbol: String, signal: Option<TradeSignal>) -> Self {
        match signal {
            Some(signal) => Self {
                symbol,
                direction: Some(signal.direction),
                strength: Some(signal.strength),
                reasoning: Some(signal.reasoning),
                message: None,
            },
            None => Self {
                symbol,
                direction: None,
                strength: None,
                reasoning: None,
                message: Some("No signal generated".to_string()),
            },
        }
    }
}
