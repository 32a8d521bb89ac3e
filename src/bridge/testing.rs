use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chat::{
    Channel, ChatError, ChatGateway, ChatResult, InboundMessage, MessageKind,
};

/// In-memory chat gateway recording everything the bridge sends.
#[derive(Default)]
pub struct RecordingGateway {
    pub channels: Vec<Channel>,
    pub posts: Mutex<Vec<(String, String)>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub fail_posts: bool,
}

impl RecordingGateway {
    pub fn with_channels(names: &[(&str, &str)]) -> Self {
        Self {
            channels: names
                .iter()
                .map(|(id, name)| Channel {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().clone()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn list_channels(&self) -> ChatResult<Vec<Channel>> {
        Ok(self.channels.clone())
    }

    async fn reply(&self, message: &InboundMessage, text: &str) -> ChatResult<()> {
        self.replies
            .lock()
            .push((message.channel.clone(), text.to_string()));
        Ok(())
    }

    async fn post(&self, channel_id: &str, text: &str) -> ChatResult<()> {
        if self.fail_posts {
            return Err(ChatError::Api {
                method: "chat.postMessage".to_string(),
                error: "not_in_channel".to_string(),
            });
        }
        self.posts
            .lock()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn inbound(text: &str, kind: MessageKind) -> InboundMessage {
    InboundMessage {
        channel: "D024BE91L".to_string(),
        user: "U2147483697".to_string(),
        text: text.to_string(),
        ts: "1355517523.000005".to_string(),
        thread_ts: None,
        kind,
    }
}
