pub mod client;
pub mod error;
pub mod events;
pub mod types;

use async_trait::async_trait;

pub use client::DeviceClient;
pub use error::{DeviceError, DeviceResult};
pub use events::{EventSource, SseDecoder, decode_stream};
pub use types::*;

/// Source of single telemetry reads; implemented by [`DeviceClient`].
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn read_telemetry(&self, endpoint: TelemetryEndpoint) -> DeviceResult<TelemetryValue>;
}
