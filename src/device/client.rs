use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, info};

use super::error::{DeviceError, DeviceResult};
use super::events::{EventSource, decode_stream};
use super::types::{TelemetryEndpoint, TelemetryValue, VariableResponse};
use super::TelemetrySource;
use crate::config::DeviceConfig;

/// HTTP client for one cloud-connected coffee maker.
#[derive(Clone)]
pub struct DeviceClient {
    http: Client,
    stream_http: Client,
    device_url: String,
    access_token: String,
    request_timeout: Duration,
    connect_timeout: Duration,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> DeviceResult<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(DeviceError::Network)?;
        // The event feed never completes, so only the connect phase is bounded.
        let stream_http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(DeviceError::Network)?;

        Ok(Self {
            http,
            stream_http,
            device_url: format!(
                "{}/v1/devices/{}",
                config.api_base.trim_end_matches('/'),
                config.device_id
            ),
            access_token: config.access_token.clone(),
            request_timeout,
            connect_timeout,
        })
    }

    pub fn endpoint_url(&self, endpoint: TelemetryEndpoint) -> String {
        format!("{}/{}", self.device_url, endpoint.variable())
    }

    pub fn events_url(&self) -> String {
        format!("{}/events", self.device_url)
    }

    pub async fn read_telemetry(&self, endpoint: TelemetryEndpoint) -> DeviceResult<TelemetryValue> {
        let url = self.endpoint_url(endpoint);
        debug!(endpoint = %endpoint, "Reading device telemetry");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| DeviceError::from_reqwest(err, self.request_timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| DeviceError::from_reqwest(err, self.request_timeout))?;

        if !status.is_success() {
            return Err(DeviceError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let parsed: VariableResponse =
            serde_json::from_str(&body).map_err(|err| DeviceError::MalformedResponse {
                endpoint,
                reason: err.to_string(),
            })?;
        let result = parsed.result.ok_or_else(|| DeviceError::MalformedResponse {
            endpoint,
            reason: "missing result field".to_string(),
        })?;

        TelemetryValue::from_json(&result).ok_or_else(|| DeviceError::MalformedResponse {
            endpoint,
            reason: format!("unsupported result value {}", result),
        })
    }

    pub async fn open_event_stream(&self) -> DeviceResult<EventSource> {
        info!("Subscribing to device events");

        let request = self
            .stream_http
            .get(self.events_url())
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "text/event-stream")
            .send();

        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .map_err(|_| DeviceError::Timeout(self.connect_timeout))?
            .map_err(|err| DeviceError::from_reqwest(err, self.connect_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        Ok(decode_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl TelemetrySource for DeviceClient {
    async fn read_telemetry(&self, endpoint: TelemetryEndpoint) -> DeviceResult<TelemetryValue> {
        DeviceClient::read_telemetry(self, endpoint).await
    }
}

fn error_detail(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    ["error_description", "error", "info"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| json.to_string())
}
