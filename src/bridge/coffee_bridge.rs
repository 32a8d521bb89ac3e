use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use super::commands::{CommandDispatcher, CommandRouter};
use super::event_bridge::{EventBridge, PhaseTracker};
use super::identity::IdentityResponder;
use super::status::StatusAggregator;
use crate::chat::{Channel, ChatGateway, SlackClient, WebhookServer};
use crate::config::Config;
use crate::device::DeviceClient;

/// Top-level service: chat session, command answering and device notifications.
pub struct CoffeeBridge {
    pub config: Config,
    slack: Arc<SlackClient>,
    device: Arc<DeviceClient>,
    aggregator: StatusAggregator,
    dispatcher: Arc<CommandDispatcher>,
    phase: PhaseTracker,
}

impl CoffeeBridge {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let slack = Arc::new(SlackClient::new(&config.chat).context("failed to build chat client")?);
        let device =
            Arc::new(DeviceClient::new(&config.device).context("failed to build device client")?);
        let aggregator = StatusAggregator::new(device.clone());
        let router = CommandRouter::new().context("failed to compile command patterns")?;
        let dispatcher = Arc::new(CommandDispatcher::new(
            slack.clone(),
            router,
            aggregator.clone(),
            IdentityResponder::new(),
        ));

        Ok(Self {
            config,
            slack,
            device,
            aggregator,
            dispatcher,
            phase: PhaseTracker::new(),
        })
    }

    /// Runs until the device subscription is lost or the webhook server stops.
    /// Returning means the process should exit with a failure status.
    pub async fn start(&self) -> anyhow::Result<()> {
        info!("Starting coffee bridge");

        let identity = self
            .slack
            .auth_test()
            .await
            .context("chat session handshake failed")?;
        info!(bot = %identity.name, user_id = %identity.user_id, "Chat session established");
        self.dispatcher.set_identity(identity);

        let gateway: Arc<dyn ChatGateway> = self.slack.clone();
        let bridge = EventBridge::connect(gateway, &self.config.chat.channel)
            .await?
            .with_phase_tracker(self.phase.clone());

        let server = WebhookServer::new(
            self.config.server.listen_address.clone(),
            self.config.chat.signing_secret.clone(),
            self.dispatcher.clone(),
            self.phase.clone(),
        );

        tokio::select! {
            result = server.serve() => {
                result?;
                error!("Chat webhook server stopped");
                Err(anyhow::anyhow!("chat webhook server stopped unexpectedly"))
            }
            result = bridge.subscribe_and_run(&self.device) => {
                result?;
                Err(anyhow::anyhow!("device event subscription ended"))
            }
        }
    }

    /// One-shot status query, formatted the same way as the chat reply.
    pub async fn status_once(&self) -> anyhow::Result<String> {
        Ok(self.aggregator.get_status().await?)
    }

    pub async fn channels(&self) -> anyhow::Result<Vec<Channel>> {
        Ok(self.slack.list_channels().await?)
    }
}
