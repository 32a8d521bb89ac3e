use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{BotIdentity, Channel, ChatError, ChatGateway, ChatResult, InboundMessage};
use crate::config::ChatConfig;
use crate::web::global_metrics;

const CHANNEL_PAGE_SIZE: u32 = 200;

/// Slack Web API client used as the bridge's chat gateway.
#[derive(Clone)]
pub struct SlackClient {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsListResponse {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ts: String,
}

impl SlackClient {
    pub fn new(config: &ChatConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Session handshake: validates the token and returns the bot identity.
    pub async fn auth_test(&self) -> ChatResult<BotIdentity> {
        let response: AuthTestResponse = self
            .call("auth.test", self.client.post(self.url("auth.test")))
            .await?;
        Ok(BotIdentity {
            user_id: response.user_id,
            name: response.user,
        })
    }

    pub async fn list_channels(&self) -> ChatResult<Vec<Channel>> {
        let mut channels = Vec::new();
        let mut cursor = String::new();

        loop {
            let request = {
                let limit = CHANNEL_PAGE_SIZE.to_string();
                let mut query = vec![
                    ("limit", limit.as_str()),
                    ("exclude_archived", "true"),
                    ("types", "public_channel"),
                ];
                if !cursor.is_empty() {
                    query.push(("cursor", cursor.as_str()));
                }
                self.client
                    .get(self.url("conversations.list"))
                    .query(&query)
            };
            let page: ConversationsListResponse =
                self.call("conversations.list", request).await?;
            channels.extend(page.channels);

            cursor = page
                .response_metadata
                .map(|meta| meta.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }

        debug!(count = channels.len(), "Listed chat channels");
        Ok(channels)
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> ChatResult<String> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let request = self
            .client
            .post(self.url("chat.postMessage"))
            .json(&payload);
        let response: PostMessageResponse = self.call("chat.postMessage", request).await?;
        Ok(response.ts)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> ChatResult<T> {
        global_metrics().record_outbound_call(method);

        let result = self.execute(method, request).await;
        if let Err(err) = &result {
            let code = match err {
                ChatError::Api { error, .. } => error.as_str(),
                ChatError::Network(_) => "network",
                ChatError::InvalidResponse { .. } => "invalid_response",
            };
            global_metrics().record_outbound_failure(method, code);
        }
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> ChatResult<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let json: Value = response.json().await?;

        if json.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = json
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            return Err(ChatError::Api {
                method: method.to_string(),
                error,
            });
        }

        serde_json::from_value(json).map_err(|err| ChatError::InvalidResponse {
            method: method.to_string(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl ChatGateway for SlackClient {
    async fn list_channels(&self) -> ChatResult<Vec<Channel>> {
        SlackClient::list_channels(self).await
    }

    async fn reply(&self, message: &InboundMessage, text: &str) -> ChatResult<()> {
        self.post_message(&message.channel, text, message.thread_ts.as_deref())
            .await?;
        Ok(())
    }

    async fn post(&self, channel_id: &str, text: &str) -> ChatResult<()> {
        self.post_message(channel_id, text, None).await?;
        Ok(())
    }
}
