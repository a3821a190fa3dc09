pub mod event;
pub mod event_bus;

pub use event::*;
pub use event_bus::{
    BusStats, EventBus, EventHandler, FnHandler, HandlerOutput, PublishReport, SubscriptionId,
};
