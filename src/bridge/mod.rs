pub mod coffee_bridge;
pub mod commands;
pub mod error;
pub mod event_bridge;
pub mod identity;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use coffee_bridge::CoffeeBridge;
pub use commands::{Command, CommandDispatcher, CommandRouter};
pub use error::{BridgeError, BridgeResult};
pub use event_bridge::{
    BridgePhase, DispatchOutcome, EventBridge, MESSAGE_BREWING, PhaseTracker, resolve_channel,
};
pub use identity::{IdentityResponder, format_uptime};
pub use status::{LevelClass, StatusAggregator, compose_reply};
