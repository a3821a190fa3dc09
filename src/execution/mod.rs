//! Order execution against a broker

pub mod broker;
pub mod executor;

pub use broker::{Broker, BrokerFill, PaperBroker};
pub use executor::{ExecutionConfig, OrderExecutor};
