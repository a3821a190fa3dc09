//! Main Coordinator
//!
//! Owns the desk lifecycle (`Initializing -> Running <-> Paused -> Stopping`),
//! boots the agents in order, runs the scheduled daily cycle and wires the
//! reactive bus path.

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod lifecycle;
pub mod schedule;
pub mod state;

pub use bootstrap::{DeskAdapters, DeskComponents};
pub use config::CoordinatorConfig;
pub use coordinator::MainCoordinator;
pub use lifecycle::{AgentLifecycle, ComponentInfo, ComponentState};
pub use schedule::next_cycle_at;
pub use state::{CycleResult, SystemState, SystemStatus};
