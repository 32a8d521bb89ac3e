mod device;

use std::path::Path;

use anyhow::Result;
pub use device::*;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Bot token used against the chat Web API
    pub token: String,
    /// Human-readable name of the channel receiving device notifications
    pub channel: String,
    /// Signing secret for inbound event callbacks; unsigned requests are accepted when unset
    pub signing_secret: Option<String>,
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            channel: String::new(),
            signing_secret: None,
            api_base: "https://slack.com/api".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub min_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub device: DeviceConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads the YAML file at `path` (or `COFFEE_BRIDGE_CONFIG`), applies
    /// environment overrides and validates the result. A missing file is not
    /// an error: the environment alone may carry every required setting.
    pub fn load(path: &str) -> Result<Self> {
        let resolved_path =
            std::env::var("COFFEE_BRIDGE_CONFIG").unwrap_or_else(|_| path.to_string());
        let mut config = if Path::new(&resolved_path).exists() {
            let content = std::fs::read_to_string(&resolved_path)?;
            serde_yaml::from_str(&content)?
        } else {
            debug!(path = %resolved_path, "Config file not found, using defaults");
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_not_placeholder("chat.token", &self.chat.token)?;
        validate_not_placeholder("chat.channel", &self.chat.channel)?;
        validate_not_placeholder("device.access_token", &self.device.access_token)?;
        validate_not_placeholder("device.device_id", &self.device.device_id)?;

        if self.chat.channel.starts_with('#') {
            anyhow::bail!(
                "chat.channel must be the bare channel name, without '#': '{}'",
                self.chat.channel
            );
        }

        url::Url::parse(&self.chat.api_base).map_err(|err| {
            anyhow::anyhow!("chat.api_base '{}' is not a valid URL: {}", self.chat.api_base, err)
        })?;
        url::Url::parse(&self.device.api_base).map_err(|err| {
            anyhow::anyhow!(
                "device.api_base '{}' is not a valid URL: {}",
                self.device.api_base,
                err
            )
        })?;

        if self.device.request_timeout_secs == 0 || self.device.connect_timeout_secs == 0 {
            anyhow::bail!("device timeouts must be > 0");
        }
        if self.chat.request_timeout_secs == 0 {
            anyhow::bail!("chat.request_timeout_secs must be > 0");
        }
        if self.server.listen_address.trim().is_empty() {
            anyhow::bail!("server.listen_address must not be empty");
        }

        Ok(())
    }

    /// Applies `COFFEE_BRIDGE_*` variables, falling back to the legacy bare names.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .find(|value| !value.trim().is_empty())
        };

        if let Some(value) = get(&["COFFEE_BRIDGE_CHAT_TOKEN", "TOKEN"]) {
            self.chat.token = value;
        }
        if let Some(value) = get(&["COFFEE_BRIDGE_CHAT_CHANNEL", "SLACK_CHANNEL"]) {
            self.chat.channel = value;
        }
        if let Some(value) = get(&["COFFEE_BRIDGE_SIGNING_SECRET", "SLACK_SIGNING_SECRET"]) {
            self.chat.signing_secret = Some(value);
        }
        if let Some(value) = get(&["COFFEE_BRIDGE_DEVICE_TOKEN", "PARTICLE_TOKEN"]) {
            self.device.access_token = value;
        }
        if let Some(value) = get(&["COFFEE_BRIDGE_DEVICE_ID", "PARTICLE_DEVICE_ID"]) {
            self.device.device_id = value;
        }
        if let Some(value) = get(&["COFFEE_BRIDGE_LISTEN_ADDRESS"]) {
            self.server.listen_address = value;
        } else if let Some(port) = get(&["PORT"]) {
            self.server.listen_address = format!("0.0.0.0:{}", port.trim());
        }
        if let Some(value) = get(&["COFFEE_BRIDGE_LOG_LEVEL"]) {
            self.logging.min_level = value;
        }
    }
}

fn validate_not_placeholder(field: &str, value: &str) -> Result<()> {
    let lowered = value.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        anyhow::bail!("required configuration field '{}' is not set", field);
    }
    let is_placeholder = lowered.contains("your_")
        || lowered.contains("changeme")
        || lowered.contains("replace_me")
        || lowered.ends_with("_here");
    if is_placeholder {
        anyhow::bail!(
            "configuration field '{}' still uses placeholder value: '{}'",
            field,
            value
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const FULL: &str = r#"
chat:
  token: xoxb-1234
  channel: coffee
device:
  device_id: 0123abcd
  access_token: particle-token
  request_timeout_secs: 3
"#;

    #[test]
    fn loads_yaml_with_defaults() {
        let config = Config::load_from_str(FULL).expect("config should load");
        assert_eq!(config.chat.channel, "coffee");
        assert_eq!(config.chat.api_base, "https://slack.com/api");
        assert_eq!(config.device.api_base, "https://api.particle.io");
        assert_eq!(config.device.request_timeout_secs, 3);
        assert_eq!(config.device.connect_timeout_secs, 30);
        assert_eq!(config.server.listen_address, "0.0.0.0:3000");
        assert!(config.chat.signing_secret.is_none());
    }

    #[test]
    fn missing_required_setting_is_rejected() {
        let err = Config::load_from_str("chat:\n  token: xoxb-1\n  channel: coffee\n")
            .expect_err("device settings are missing");
        assert!(err.to_string().contains("device.access_token"));
    }

    #[test]
    fn placeholder_is_rejected() {
        let yaml = FULL.replace("particle-token", "your_particle_token");
        let err = Config::load_from_str(&yaml).expect_err("placeholder must fail");
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn hash_prefixed_channel_is_rejected() {
        let yaml = FULL.replace("channel: coffee", "channel: \"#coffee\"");
        assert!(Config::load_from_str(&yaml).is_err());
    }

    #[test]
    fn legacy_environment_names_fill_an_empty_config() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TOKEN", "xoxb-env"),
            ("PARTICLE_TOKEN", "particle-env"),
            ("PARTICLE_DEVICE_ID", "device-env"),
            ("SLACK_CHANNEL", "kitchen"),
            ("PORT", "8080"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        config.validate().expect("environment supplies everything");
        assert_eq!(config.chat.token, "xoxb-env");
        assert_eq!(config.chat.channel, "kitchen");
        assert_eq!(config.device.access_token, "particle-env");
        assert_eq!(config.device.device_id, "device-env");
        assert_eq!(config.server.listen_address, "0.0.0.0:8080");
    }

    #[test]
    fn prefixed_names_win_over_legacy_ones() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TOKEN", "legacy"),
            ("COFFEE_BRIDGE_CHAT_TOKEN", "prefixed"),
            ("COFFEE_BRIDGE_DEVICE_ID", "  "),
            ("PARTICLE_DEVICE_ID", "fallback"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.chat.token, "prefixed");
        assert_eq!(config.device.device_id, "fallback");
    }
}
