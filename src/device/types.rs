use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Event kind carrying brewing-state changes.
pub const STATUS_EVENT: &str = "STATUS";

/// Token published by the device when it starts a brew.
pub const BREWING_TOKEN: &str = "BREWING";

/// The three telemetry legs exposed by the coffee maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryEndpoint {
    Temperature,
    Status,
    Level,
}

impl TelemetryEndpoint {
    /// Name of the cloud variable backing this endpoint.
    pub fn variable(self) -> &'static str {
        match self {
            TelemetryEndpoint::Temperature => "temp",
            TelemetryEndpoint::Status => "status",
            TelemetryEndpoint::Level => "level",
        }
    }
}

impl fmt::Display for TelemetryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TelemetryEndpoint::Temperature => "temperature",
            TelemetryEndpoint::Status => "status",
            TelemetryEndpoint::Level => "level",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    Number(f64),
    Text(String),
}

impl TelemetryValue {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(TelemetryValue::Number),
            Value::String(s) => Some(TelemetryValue::Text(s.clone())),
            Value::Bool(b) => Some(TelemetryValue::Text(b.to_string())),
            _ => None,
        }
    }

    /// Numeric reading; numeric strings are accepted as well.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Number(n) => Some(*n),
            TelemetryValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Number(n) => write!(f, "{}", n),
            TelemetryValue::Text(s) => f.write_str(s),
        }
    }
}

/// Body of a cloud variable read.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VariableResponse {
    pub result: Option<Value>,
}

/// A point-in-time read of the three telemetry legs.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub temperature: f64,
    pub status: String,
    pub level: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub kind: String,
    pub data: String,
}

impl DeviceEvent {
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: data.into(),
        }
    }

    pub fn is_status(&self) -> bool {
        self.kind == STATUS_EVENT
    }

    /// Parses the JSON envelope published with a `STATUS` event.
    pub fn status_payload(&self) -> Result<StatusPayload, EventParseError> {
        serde_json::from_str(&self.data).map_err(|err| EventParseError {
            kind: self.kind.clone(),
            reason: err.to_string(),
        })
    }
}

/// Envelope of a published event; `data` is the brewing-state token.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub data: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl StatusPayload {
    pub fn is_brewing(&self) -> bool {
        self.data == BREWING_TOKEN
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed {kind} event payload: {reason}")]
pub struct EventParseError {
    pub kind: String,
    pub reason: String,
}
