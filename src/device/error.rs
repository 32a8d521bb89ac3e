use std::time::Duration;

use thiserror::Error;

use super::types::TelemetryEndpoint;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("device rejected request (status {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("malformed {endpoint} response: {reason}")]
    MalformedResponse {
        endpoint: TelemetryEndpoint,
        reason: String,
    },

    #[error("event stream error: {0}")]
    Stream(String),
}

impl DeviceError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            DeviceError::Timeout(timeout)
        } else {
            DeviceError::Network(err)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Timeout(_))
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;
