pub mod error;
pub mod slack;
pub mod webhook;

use async_trait::async_trait;
use serde::Deserialize;

pub use error::{ChatError, ChatResult};
pub use slack::SlackClient;
pub use webhook::{InboundHandler, WebhookServer};

/// A channel of the chat workspace, as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Identity of the bot user, learned when the session is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub name: String,
}

/// How the bot was addressed by an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    DirectMessage,
    DirectMention,
    Mention,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub kind: MessageKind,
}

/// Outbound side of the chat platform as seen by the bridge.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn list_channels(&self) -> ChatResult<Vec<Channel>>;

    /// Answers `message` in the conversation it came from.
    async fn reply(&self, message: &InboundMessage, text: &str) -> ChatResult<()>;

    async fn post(&self, channel_id: &str, text: &str) -> ChatResult<()>;
}
