use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use super::error::{BridgeError, BridgeResult};
use crate::chat::{Channel, ChatGateway};
use crate::device::{DeviceClient, DeviceEvent, EventSource};
use crate::web::global_metrics;

pub const MESSAGE_BREWING: &str =
    "I am preparing some coffee, stay tuned, I will let you know when is ready.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgePhase {
    Uninitialized = 0,
    Subscribing = 1,
    Listening = 2,
    Dispatching = 3,
    Stopped = 4,
}

impl BridgePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BridgePhase::Subscribing,
            2 => BridgePhase::Listening,
            3 => BridgePhase::Dispatching,
            4 => BridgePhase::Stopped,
            _ => BridgePhase::Uninitialized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BridgePhase::Uninitialized => "uninitialized",
            BridgePhase::Subscribing => "subscribing",
            BridgePhase::Listening => "listening",
            BridgePhase::Dispatching => "dispatching",
            BridgePhase::Stopped => "stopped",
        }
    }

    pub fn is_subscribed(self) -> bool {
        matches!(self, BridgePhase::Listening | BridgePhase::Dispatching)
    }
}

/// Shared view of the event bridge lifecycle, read by the readiness probe.
#[derive(Debug, Clone, Default)]
pub struct PhaseTracker(Arc<AtomicU8>);

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> BridgePhase {
        BridgePhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: BridgePhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Notified,
    IgnoredKind,
    IgnoredToken(String),
    Malformed,
    DeliveryFailed,
}

/// Looks up the notification channel by name in the workspace directory.
pub async fn resolve_channel(gateway: &dyn ChatGateway, name: &str) -> BridgeResult<Channel> {
    let channels = gateway.list_channels().await?;
    channels
        .into_iter()
        .find(|channel| channel.name == name)
        .ok_or_else(|| BridgeError::ChannelNotFound(name.to_string()))
}

/// Turns device `STATUS` events into channel notifications.
pub struct EventBridge {
    gateway: Arc<dyn ChatGateway>,
    channel: Channel,
    phase: PhaseTracker,
}

impl EventBridge {
    pub fn new(gateway: Arc<dyn ChatGateway>, channel: Channel) -> Self {
        Self {
            gateway,
            channel,
            phase: PhaseTracker::new(),
        }
    }

    /// Resolves `channel_name` and builds the bridge; fails before any subscription
    /// is opened when the channel does not exist.
    pub async fn connect(gateway: Arc<dyn ChatGateway>, channel_name: &str) -> BridgeResult<Self> {
        let channel = resolve_channel(gateway.as_ref(), channel_name).await?;
        info!(channel = %channel.name, channel_id = %channel.id, "Resolved notification channel");
        Ok(Self::new(gateway, channel))
    }

    pub fn with_phase_tracker(mut self, phase: PhaseTracker) -> Self {
        self.phase = phase;
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn phase(&self) -> BridgePhase {
        self.phase.get()
    }

    pub async fn dispatch(&self, event: &DeviceEvent) -> DispatchOutcome {
        global_metrics().record_device_event(&event.kind);

        if !event.is_status() {
            debug!(kind = %event.kind, "Ignoring device event");
            return DispatchOutcome::IgnoredKind;
        }

        let payload = match event.status_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, data = %event.data, "Dropping malformed device event");
                return DispatchOutcome::Malformed;
            }
        };
        debug!(token = %payload.data, published_at = ?payload.published_at, "Status event received");

        if !payload.is_brewing() {
            return DispatchOutcome::IgnoredToken(payload.data);
        }

        info!(channel = %self.channel.name, "Device started brewing, notifying channel");
        match self.gateway.post(&self.channel.id, MESSAGE_BREWING).await {
            Ok(()) => {
                global_metrics().record_notification(true);
                DispatchOutcome::Notified
            }
            Err(err) => {
                global_metrics().record_notification(false);
                error!(channel_id = %self.channel.id, error = %err, "Failed to post brewing notification");
                DispatchOutcome::DeliveryFailed
            }
        }
    }

    /// Consumes `events` one at a time until the stream ends. Only returns on
    /// subscription loss, which is always an error.
    pub async fn run(&self, mut events: EventSource) -> BridgeResult<()> {
        self.phase.set(BridgePhase::Listening);
        info!("Listening for device events");

        let reason = loop {
            match events.next().await {
                Some(Ok(event)) => {
                    self.phase.set(BridgePhase::Dispatching);
                    let outcome = self.dispatch(&event).await;
                    debug!(kind = %event.kind, outcome = ?outcome, "Device event dispatched");
                    self.phase.set(BridgePhase::Listening);
                }
                Some(Err(err)) => break err.to_string(),
                None => break "event stream closed by remote".to_string(),
            }
        };

        self.phase.set(BridgePhase::Stopped);
        error!(reason = %reason, "Device event subscription lost");
        Err(BridgeError::SubscriptionLost(reason))
    }

    pub async fn subscribe_and_run(&self, device: &DeviceClient) -> BridgeResult<()> {
        self.phase.set(BridgePhase::Subscribing);
        let events = match device.open_event_stream().await {
            Ok(events) => events,
            Err(err) => {
                self.phase.set(BridgePhase::Stopped);
                return Err(BridgeError::Subscribe(err));
            }
        };
        self.run(events).await
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::bridge::testing::RecordingGateway;
    use crate::device::{DeviceError, DeviceResult};

    fn status_event(token: &str) -> DeviceEvent {
        DeviceEvent::new(
            "STATUS",
            format!(r#"{{"data":"{token}","ttl":60,"published_at":"2016-03-01T10:00:00.000Z","coreid":"abc"}}"#),
        )
    }

    fn source(events: Vec<DeviceResult<DeviceEvent>>) -> EventSource {
        Box::pin(stream::iter(events))
    }

    fn bridge(gateway: Arc<RecordingGateway>) -> EventBridge {
        EventBridge::new(
            gateway,
            Channel {
                id: "C0COFFEE".to_string(),
                name: "coffee".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn brewing_event_posts_one_notification() {
        let gateway = Arc::new(RecordingGateway::default());
        let bridge = bridge(gateway.clone());

        let outcome = bridge.dispatch(&status_event("BREWING")).await;

        assert_eq!(outcome, DispatchOutcome::Notified);
        assert_eq!(
            gateway.posts(),
            vec![("C0COFFEE".to_string(), MESSAGE_BREWING.to_string())]
        );
    }

    #[tokio::test]
    async fn other_tokens_and_kinds_are_ignored() {
        let gateway = Arc::new(RecordingGateway::default());
        let bridge = bridge(gateway.clone());

        assert_eq!(
            bridge.dispatch(&status_event("IDLE")).await,
            DispatchOutcome::IgnoredToken("IDLE".to_string())
        );
        assert_eq!(
            bridge.dispatch(&status_event("brewing")).await,
            DispatchOutcome::IgnoredToken("brewing".to_string())
        );
        assert_eq!(
            bridge
                .dispatch(&DeviceEvent::new("LEVEL", r#"{"data":"BREWING"}"#))
                .await,
            DispatchOutcome::IgnoredKind
        );
        assert!(gateway.posts().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped() {
        let gateway = Arc::new(RecordingGateway::default());
        let bridge = bridge(gateway.clone());

        assert_eq!(
            bridge.dispatch(&DeviceEvent::new("STATUS", "BREWING")).await,
            DispatchOutcome::Malformed
        );
        assert!(gateway.posts().is_empty());
    }

    #[tokio::test]
    async fn repeated_brewing_events_are_not_deduplicated() {
        let gateway = Arc::new(RecordingGateway::default());
        let bridge = bridge(gateway.clone());

        let result = bridge
            .run(source(vec![
                Ok(status_event("BREWING")),
                Ok(DeviceEvent::new("STATUS", "{not json")),
                Ok(status_event("BREWING")),
            ]))
            .await;

        assert!(matches!(result, Err(BridgeError::SubscriptionLost(_))));
        assert_eq!(gateway.posts().len(), 2);
        assert_eq!(bridge.phase(), BridgePhase::Stopped);
    }

    #[tokio::test]
    async fn stream_error_ends_the_subscription() {
        let gateway = Arc::new(RecordingGateway::default());
        let bridge = bridge(gateway.clone());

        let result = bridge
            .run(source(vec![
                Err(DeviceError::Stream("connection reset".to_string())),
                Ok(status_event("BREWING")),
            ]))
            .await;

        match result {
            Err(BridgeError::SubscriptionLost(reason)) => {
                assert!(reason.contains("connection reset"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(gateway.posts().is_empty());
    }

    #[tokio::test]
    async fn failed_post_keeps_listening() {
        let gateway = Arc::new(RecordingGateway {
            fail_posts: true,
            ..Default::default()
        });
        let bridge = bridge(gateway.clone());

        assert_eq!(
            bridge.dispatch(&status_event("BREWING")).await,
            DispatchOutcome::DeliveryFailed
        );
    }

    #[tokio::test]
    async fn connect_resolves_channel_by_name() {
        let gateway = Arc::new(RecordingGateway::with_channels(&[
            ("C0GENERAL", "general"),
            ("C0COFFEE", "coffee"),
        ]));

        let bridge = EventBridge::connect(gateway, "coffee")
            .await
            .expect("channel exists");
        assert_eq!(bridge.channel().id, "C0COFFEE");
        assert_eq!(bridge.phase(), BridgePhase::Uninitialized);
    }

    #[tokio::test]
    async fn unknown_channel_fails_before_listening() {
        let gateway = Arc::new(RecordingGateway::with_channels(&[("C0GENERAL", "general")]));

        let err = EventBridge::connect(gateway.clone(), "coffee")
            .await
            .err()
            .expect("channel is missing");
        assert!(matches!(err, BridgeError::ChannelNotFound(name) if name == "coffee"));
        assert!(gateway.posts().is_empty());
    }

    #[test]
    fn phase_tracker_is_shared() {
        let tracker = PhaseTracker::new();
        let clone = tracker.clone();
        tracker.set(BridgePhase::Listening);
        assert_eq!(clone.get(), BridgePhase::Listening);
        assert!(clone.get().is_subscribed());
        assert!(!BridgePhase::Subscribing.is_subscribed());
    }
}
