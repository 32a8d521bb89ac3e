//! Slack Events API receiver.

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use salvo::affix_state;
use salvo::prelude::*;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use super::{InboundMessage, MessageKind};
use crate::bridge::PhaseTracker;
use crate::web::{health_endpoint, metrics_endpoint, ready_endpoint};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed request, in seconds.
const MAX_REQUEST_AGE_SECS: u64 = 60 * 5;

/// Receives inbound chat messages addressed to the bot.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    async fn handle_message(&self, message: InboundMessage);
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        #[serde(default)]
        event_id: Option<String>,
        event: SlackEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Callback {
    UrlVerification(String),
    Message(InboundMessage),
    Ignored(&'static str),
}

/// Classifies an Events API payload.
pub fn parse_callback(body: &[u8]) -> Result<Callback, serde_json::Error> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    let (event_id, event) = match envelope {
        Envelope::UrlVerification { challenge } => return Ok(Callback::UrlVerification(challenge)),
        Envelope::EventCallback { event_id, event } => (event_id, event),
        Envelope::Other => return Ok(Callback::Ignored("unsupported envelope")),
    };

    if event.bot_id.is_some() {
        return Ok(Callback::Ignored("bot message"));
    }
    if event.subtype.is_some() {
        return Ok(Callback::Ignored("message subtype"));
    }

    let (Some(channel), Some(user), Some(text), Some(ts)) =
        (event.channel, event.user, event.text, event.ts)
    else {
        return Ok(Callback::Ignored("incomplete event"));
    };

    let kind = match event.kind.as_str() {
        "app_mention" if text.trim_start().starts_with("<@") => MessageKind::DirectMention,
        "app_mention" => MessageKind::Mention,
        "message" if event.channel_type.as_deref() == Some("im") => MessageKind::DirectMessage,
        _ => return Ok(Callback::Ignored("not addressed to the bot")),
    };

    debug!(event_id = ?event_id, kind = ?kind, "Parsed chat event");
    Ok(Callback::Message(InboundMessage {
        channel,
        user,
        text,
        ts,
        thread_ts: event.thread_ts,
        kind,
    }))
}

/// Checks `X-Slack-Signature` against `v0:{timestamp}:{body}`.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_secs: i64,
) -> bool {
    let Ok(sent_at) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    if now_secs.abs_diff(sent_at) > MAX_REQUEST_AGE_SECS {
        return false;
    }
    let Some(provided) = signature.trim().strip_prefix("v0=") else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{}:", timestamp.trim()).as_bytes());
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// HTTP front door: event callbacks plus health, readiness and metrics.
pub struct WebhookServer {
    listen_address: String,
    signing_secret: Option<String>,
    handler: Arc<dyn InboundHandler>,
    phase: PhaseTracker,
}

impl WebhookServer {
    pub fn new(
        listen_address: String,
        signing_secret: Option<String>,
        handler: Arc<dyn InboundHandler>,
        phase: PhaseTracker,
    ) -> Self {
        Self {
            listen_address,
            signing_secret,
            handler,
            phase,
        }
    }

    /// Binds the listen address and serves until the server stops. A bind
    /// failure is returned instead of aborting the process.
    pub async fn serve(&self) -> anyhow::Result<()> {
        let router = self.router();
        let acceptor = TcpListener::new(self.listen_address.clone())
            .try_bind()
            .await
            .map_err(|err| {
                anyhow::anyhow!(
                    "failed to bind chat webhook on {}: {}",
                    self.listen_address,
                    err
                )
            })?;
        info!(address = %self.listen_address, "Chat webhook listening");
        Server::new(acceptor).serve(router).await;
        Ok(())
    }

    pub fn router(&self) -> Router {
        if self.signing_secret.is_none() {
            warn!("No signing secret configured, inbound callbacks are not authenticated");
        }
        let events = EventsHandler {
            signing_secret: self.signing_secret.clone(),
            handler: self.handler.clone(),
        };

        Router::new()
            .hoop(Logger::new())
            .hoop(affix_state::inject(self.phase.clone()))
            .push(Router::with_path("slack/events").post(events))
            .push(Router::with_path("health").get(health_endpoint))
            .push(Router::with_path("ready").get(ready_endpoint))
            .push(Router::with_path("metrics").get(metrics_endpoint))
    }
}

struct EventsHandler {
    signing_secret: Option<String>,
    handler: Arc<dyn InboundHandler>,
}

#[async_trait]
impl Handler for EventsHandler {
    async fn handle(
        &self,
        req: &mut Request,
        _depot: &mut Depot,
        res: &mut Response,
        _ctrl: &mut FlowCtrl,
    ) {
        let timestamp = req
            .header::<String>("X-Slack-Request-Timestamp")
            .unwrap_or_default();
        let signature = req.header::<String>("X-Slack-Signature").unwrap_or_default();
        let retry_num = req.header::<String>("X-Slack-Retry-Num");

        let body = match req.payload().await {
            Ok(bytes) => bytes.clone(),
            Err(err) => {
                error!("Failed to read event payload: {}", err);
                res.status_code(StatusCode::BAD_REQUEST);
                res.render("invalid payload");
                return;
            }
        };

        if let Some(secret) = &self.signing_secret {
            let now = chrono::Utc::now().timestamp();
            if !verify_signature(secret, &timestamp, &body, &signature, now) {
                warn!("Rejected chat event with invalid signature");
                res.status_code(StatusCode::UNAUTHORIZED);
                res.render("invalid signature");
                return;
            }
        }

        let callback = match parse_callback(&body) {
            Ok(callback) => callback,
            Err(err) => {
                error!("Failed to parse chat event: {}", err);
                res.status_code(StatusCode::BAD_REQUEST);
                res.render("invalid json");
                return;
            }
        };

        match callback {
            Callback::UrlVerification(challenge) => {
                res.status_code(StatusCode::OK);
                res.render(Text::Plain(challenge));
                return;
            }
            Callback::Message(message) => {
                if let Some(retry) = retry_num {
                    debug!(retry = %retry, "Dropping redelivered chat event");
                } else {
                    // Events must be acknowledged quickly; answer in the background.
                    let handler = self.handler.clone();
                    tokio::spawn(async move { handler.handle_message(message).await });
                }
            }
            Callback::Ignored(reason) => {
                debug!(reason, "Ignoring chat event");
            }
        }

        res.status_code(StatusCode::OK);
        res.render("ok");
    }
}
