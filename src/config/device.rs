use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Identifier of the coffee maker in the device cloud
    pub device_id: String,

    /// Pre-obtained cloud access token
    pub access_token: String,

    /// Base URL of the device cloud API
    pub api_base: String,

    /// Deadline for a single telemetry read, in seconds
    pub request_timeout_secs: u64,

    /// Deadline for opening the event stream, in seconds
    pub connect_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            access_token: String::new(),
            api_base: default_device_api_base(),
            request_timeout_secs: 10,
            connect_timeout_secs: 30,
        }
    }
}

fn default_device_api_base() -> String {
    "https://api.particle.io".to_string()
}
