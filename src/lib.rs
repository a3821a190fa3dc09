pub mod agents;
pub mod api;
pub mod approval;
pub mod bus;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod execution;
pub mod risk;

pub use approval::{ApprovalAuthority, EmergencyLevel};
pub use bus::{Event, EventBus, EventPayload, EventType};
pub use config::AppConfig;
pub use coordinator::{CycleResult, MainCoordinator, SystemState, SystemStatus};
pub use error::{CollaboratorError, DeskError, Result};
pub use risk::RiskGuard;
