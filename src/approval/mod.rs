pub mod authority;
pub mod emergency;
pub mod plan;

pub use authority::{decide, ApprovalAuthority, ApprovalConfig, ApprovalStatus};
pub use emergency::{EmergencyLevel, EmergencyState};
pub use plan::DailyPlan;
