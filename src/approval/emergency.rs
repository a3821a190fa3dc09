use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered emergency severity. `Critical` halts all trading and is only
/// cleared by an explicit `set_emergency` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmergencyLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl EmergencyLevel {
    /// Buying is disallowed at High and above
    pub fn blocks_buying(&self) -> bool {
        *self >= EmergencyLevel::High
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, EmergencyLevel::Critical)
    }
}

impl std::fmt::Display for EmergencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmergencyLevel::None => write!(f, "NONE"),
            EmergencyLevel::Low => write!(f, "LOW"),
            EmergencyLevel::Medium => write!(f, "MEDIUM"),
            EmergencyLevel::High => write!(f, "HIGH"),
            EmergencyLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for EmergencyLevel {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(EmergencyLevel::None),
            "low" => Ok(EmergencyLevel::Low),
            "medium" => Ok(EmergencyLevel::Medium),
            "high" => Ok(EmergencyLevel::High),
            "critical" => Ok(EmergencyLevel::Critical),
            other => Err(format!("unknown emergency level: {}", other)),
        }
    }
}

/// Current emergency state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergencyState {
    pub level: EmergencyLevel,
    pub reason: Option<String>,
    pub changed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(EmergencyLevel::None < EmergencyLevel::Low);
        assert!(EmergencyLevel::High < EmergencyLevel::Critical);
        assert!(EmergencyLevel::High.blocks_buying());
        assert!(EmergencyLevel::Critical.blocks_buying());
        assert!(!EmergencyLevel::Medium.blocks_buying());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!("Critical".parse::<EmergencyLevel>(), Ok(EmergencyLevel::Critical));
        assert_eq!(" low ".parse::<EmergencyLevel>(), Ok(EmergencyLevel::Low));
        assert!("severe".parse::<EmergencyLevel>().is_err());
    }
}
