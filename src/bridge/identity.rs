use std::time::Instant;

use crate::chat::BotIdentity;

/// Renders an uptime the way people say it: seconds, then minutes past one
/// minute, then hours past one hour.
pub fn format_uptime(seconds: f64) -> String {
    let mut value = seconds;
    let mut unit = "second";
    if value > 60.0 {
        value /= 60.0;
        unit = "minute";
    }
    if value > 60.0 {
        value /= 60.0;
        unit = "hour";
    }
    let plural = if value == 1.0 { "" } else { "s" };
    format!("{} {}{}", value, unit, plural)
}

pub struct IdentityResponder {
    started_at: Instant,
    hostname: String,
}

impl IdentityResponder {
    pub fn new() -> Self {
        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown host".to_string());
        Self::with_hostname(hostname)
    }

    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            started_at: Instant::now(),
            hostname: hostname.into(),
        }
    }

    pub fn reply(&self, identity: &BotIdentity) -> String {
        self.reply_with_uptime(identity, self.started_at.elapsed().as_secs_f64())
    }

    pub fn reply_with_uptime(&self, identity: &BotIdentity, uptime_secs: f64) -> String {
        format!(
            ":robot_face: I am a bot named <@{}>. I have been running for {} on {}.",
            identity.user_id,
            format_uptime(uptime_secs),
            self.hostname
        )
    }
}

impl Default for IdentityResponder {
    fn default() -> Self {
        Self::new()
    }
}
