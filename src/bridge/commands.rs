use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error, info};

use super::identity::IdentityResponder;
use super::status::StatusAggregator;
use crate::chat::{BotIdentity, ChatGateway, InboundHandler, InboundMessage};
use crate::web::global_metrics;

const IDENTITY_PATTERNS: &[&str] = &["uptime", "identify yourself", "who are you", "what is your name"];
const STATUS_PATTERNS: &[&str] = &["status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Identify,
    Status,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Identify => "identify",
            Command::Status => "status",
        }
    }
}

/// Matches message text against the command patterns, in registration order.
pub struct CommandRouter {
    rules: Vec<(Regex, Command)>,
    mention: Regex,
}

impl CommandRouter {
    pub fn new() -> Result<Self, regex::Error> {
        let mut rules = Vec::new();
        for (patterns, command) in [
            (IDENTITY_PATTERNS, Command::Identify),
            (STATUS_PATTERNS, Command::Status),
        ] {
            for pattern in patterns {
                rules.push((Regex::new(&format!("(?i){}", pattern))?, command));
            }
        }

        Ok(Self {
            rules,
            mention: Regex::new(r"<@[A-Z0-9]+(\|[^>]*)?>")?,
        })
    }

    pub fn route(&self, text: &str) -> Option<Command> {
        let text = self.mention.replace_all(text, "");
        let text = text.trim();
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, command)| *command)
    }
}

/// Answers inbound chat messages through the chat gateway.
pub struct CommandDispatcher {
    gateway: Arc<dyn ChatGateway>,
    router: CommandRouter,
    aggregator: StatusAggregator,
    responder: IdentityResponder,
    identity: OnceLock<BotIdentity>,
}

impl CommandDispatcher {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        router: CommandRouter,
        aggregator: StatusAggregator,
        responder: IdentityResponder,
    ) -> Self {
        Self {
            gateway,
            router,
            aggregator,
            responder,
            identity: OnceLock::new(),
        }
    }

    /// Records the bot identity learned at session start; later calls are ignored.
    pub fn set_identity(&self, identity: BotIdentity) {
        if self.identity.set(identity).is_err() {
            debug!("Bot identity already set");
        }
    }

    /// Computes the reply for `message`, if it is a command.
    pub async fn respond(&self, message: &InboundMessage) -> Option<String> {
        let command = self.router.route(&message.text)?;
        global_metrics().record_inbound_message(command.as_str());
        info!(
            command = command.as_str(),
            channel = %message.channel,
            user = %message.user,
            kind = ?message.kind,
            "Handling chat command"
        );

        let reply = match command {
            Command::Status => self.aggregator.status_reply().await,
            Command::Identify => {
                let identity = self.identity.get().cloned().unwrap_or_else(|| BotIdentity {
                    user_id: "unknown".to_string(),
                    name: "unknown".to_string(),
                });
                self.responder.reply(&identity)
            }
        };
        Some(reply)
    }
}

#[async_trait]
impl InboundHandler for CommandDispatcher {
    async fn handle_message(&self, message: InboundMessage) {
        let Some(reply) = self.respond(&message).await else {
            debug!(channel = %message.channel, "Message is not a command");
            return;
        };
        if let Err(err) = self.gateway.reply(&message, &reply).await {
            error!(channel = %message.channel, error = %err, "Failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::bridge::status::{MESSAGE_RUNNING_NORMAL, STATUS_FAILURE_REPLY};
    use crate::bridge::testing::{RecordingGateway, inbound};
    use crate::chat::MessageKind;
    use crate::device::{
        DeviceError, DeviceResult, TelemetryEndpoint, TelemetrySource, TelemetryValue,
    };

    struct StaticSource {
        offline: bool,
    }

    #[async_trait]
    impl TelemetrySource for StaticSource {
        async fn read_telemetry(&self, endpoint: TelemetryEndpoint) -> DeviceResult<TelemetryValue> {
            if self.offline {
                return Err(DeviceError::Rejected {
                    status: 408,
                    detail: "Timed out.".to_string(),
                });
            }
            Ok(match endpoint {
                TelemetryEndpoint::Temperature => TelemetryValue::Number(68.0),
                TelemetryEndpoint::Status => TelemetryValue::Text("READY".to_string()),
                TelemetryEndpoint::Level => TelemetryValue::Number(40.0),
            })
        }
    }

    fn dispatcher(gateway: Arc<RecordingGateway>, offline: bool) -> CommandDispatcher {
        let dispatcher = CommandDispatcher::new(
            gateway,
            CommandRouter::new().expect("patterns compile"),
            StatusAggregator::new(Arc::new(StaticSource { offline })),
            IdentityResponder::with_hostname("kitchen-pi"),
        );
        dispatcher.set_identity(BotIdentity {
            user_id: "U0BARISTA".to_string(),
            name: "barista".to_string(),
        });
        dispatcher
    }

    #[test]
    fn routes_patterns_case_insensitively() {
        let router = CommandRouter::new().expect("patterns compile");
        assert_eq!(router.route("STATUS please"), Some(Command::Status));
        assert_eq!(router.route("what's the status?"), Some(Command::Status));
        assert_eq!(router.route("Who are you?"), Some(Command::Identify));
        assert_eq!(router.route("uptime"), Some(Command::Identify));
        assert_eq!(router.route("Identify yourself"), Some(Command::Identify));
        assert_eq!(router.route("hello there"), None);
    }

    #[test]
    fn identity_patterns_take_precedence() {
        let router = CommandRouter::new().expect("patterns compile");
        assert_eq!(router.route("who are you and what is your status"), Some(Command::Identify));
    }

    #[test]
    fn mention_markup_is_ignored() {
        let router = CommandRouter::new().expect("patterns compile");
        assert_eq!(router.route("<@U0BARISTA> status"), Some(Command::Status));
        assert_eq!(router.route("<@U0STATUS|status> hi"), None);
    }

    #[tokio::test]
    async fn status_command_replies_with_snapshot() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), false);

        dispatcher
            .handle_message(inbound("<@U0BARISTA> status", MessageKind::DirectMention))
            .await;

        let replies = gateway.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].1,
            format!("{MESSAGE_RUNNING_NORMAL} :coffee: READY :thermometer: 68ºC :level_slider: 40%")
        );
        assert!(gateway.posts().is_empty());
    }

    #[tokio::test]
    async fn failed_status_still_gets_an_answer() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), true);

        dispatcher
            .handle_message(inbound("status", MessageKind::DirectMessage))
            .await;

        assert_eq!(
            gateway.replies(),
            vec![("D024BE91L".to_string(), STATUS_FAILURE_REPLY.to_string())]
        );
    }

    #[tokio::test]
    async fn identity_command_names_the_bot() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), false);

        let reply = dispatcher
            .respond(&inbound("who are you", MessageKind::Mention))
            .await
            .expect("identity is a command");
        assert!(reply.starts_with(":robot_face: I am a bot named <@U0BARISTA>."));
        assert!(reply.ends_with("on kitchen-pi."));
    }

    #[tokio::test]
    async fn small_talk_is_ignored() {
        let gateway = Arc::new(RecordingGateway::default());
        let dispatcher = dispatcher(gateway.clone(), false);

        dispatcher
            .handle_message(inbound("good morning", MessageKind::DirectMessage))
            .await;
        assert!(gateway.replies().is_empty());
    }
}
