pub mod circuit_breaker;
pub mod guard;
pub mod types;

pub use circuit_breaker::{BreakerReset, BreakerSnapshot, CircuitBreaker};
pub use guard::{OrderCheck, RiskConfig, RiskGuard, RiskStatus};
pub use types::{DailyLossRecord, RiskCheckReport, RiskCheckResult};
