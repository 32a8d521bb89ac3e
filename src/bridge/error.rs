use thiserror::Error;

use crate::chat::ChatError;
use crate::device::{DeviceError, TelemetryEndpoint};

#[derive(Debug, Error)]
pub enum BridgeError {
    /// First failing leg of a concurrent status query.
    #[error("status query failed on {leg} leg: {source}")]
    Aggregation {
        leg: TelemetryEndpoint,
        #[source]
        source: DeviceError,
    },

    #[error("channel '{0}' not found in the chat workspace")]
    ChannelNotFound(String),

    #[error("failed to open device event stream: {0}")]
    Subscribe(#[source] DeviceError),

    #[error("device event subscription lost: {0}")]
    SubscriptionLost(String),

    #[error("chat error: {0}")]
    Chat(#[from] ChatError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
