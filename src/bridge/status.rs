use std::sync::Arc;

use tracing::{debug, warn};

use super::error::{BridgeError, BridgeResult};
use crate::device::{
    DeviceError, StatusSnapshot, TelemetryEndpoint, TelemetrySource, TelemetryValue,
};
use crate::web::{ScopedTimer, global_metrics};

pub const MESSAGE_RUNNING_LOW: &str =
    "We have no coffee, sorry, but you can go to the kitchen and prepare more!";
pub const MESSAGE_RUNNING_NORMAL: &str = "I still have coffee, but not for long... hurry!";
pub const MESSAGE_RUNNING_FULL: &str = "I’m full of coffee, run and take you dosis!";
pub const STATUS_FAILURE_REPLY: &str =
    "Sorry, I could not reach the coffee maker right now. Please try again later.";

/// Fill-level classes reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelClass {
    Low,
    Normal,
    Full,
}

impl LevelClass {
    /// `<= 10` is low, `>= 90` is full, everything in between is normal.
    pub fn classify(level: f64) -> Self {
        if level <= 10.0 {
            LevelClass::Low
        } else if level < 90.0 {
            LevelClass::Normal
        } else {
            LevelClass::Full
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            LevelClass::Low => MESSAGE_RUNNING_LOW,
            LevelClass::Normal => MESSAGE_RUNNING_NORMAL,
            LevelClass::Full => MESSAGE_RUNNING_FULL,
        }
    }
}

pub fn compose_reply(snapshot: &StatusSnapshot) -> String {
    format!(
        "{} :coffee: {} :thermometer: {}ºC :level_slider: {}%",
        LevelClass::classify(snapshot.level).message(),
        snapshot.status,
        snapshot.temperature,
        snapshot.level
    )
}

/// Answers status queries by reading the three telemetry legs concurrently.
#[derive(Clone)]
pub struct StatusAggregator {
    source: Arc<dyn TelemetrySource>,
}

impl StatusAggregator {
    pub fn new(source: Arc<dyn TelemetrySource>) -> Self {
        Self { source }
    }

    /// Reads all legs at once; the first failing leg aborts the snapshot.
    pub async fn snapshot(&self) -> BridgeResult<StatusSnapshot> {
        let source = &self.source;
        let read = |leg: TelemetryEndpoint| async move {
            source
                .read_telemetry(leg)
                .await
                .map_err(|source| BridgeError::Aggregation { leg, source })
        };

        let (temperature, status, level) = tokio::try_join!(
            read(TelemetryEndpoint::Temperature),
            read(TelemetryEndpoint::Status),
            read(TelemetryEndpoint::Level),
        )?;

        Ok(StatusSnapshot {
            temperature: numeric(TelemetryEndpoint::Temperature, &temperature)?,
            status: status.to_string(),
            level: numeric(TelemetryEndpoint::Level, &level)?,
        })
    }

    pub async fn get_status(&self) -> BridgeResult<String> {
        let snapshot = self.snapshot().await?;
        debug!(
            temperature = snapshot.temperature,
            status = %snapshot.status,
            level = snapshot.level,
            "Device status snapshot"
        );
        Ok(compose_reply(&snapshot))
    }

    /// Like [`get_status`](Self::get_status), but never leaves the user without an answer.
    pub async fn status_reply(&self) -> String {
        let _timer = ScopedTimer::new("status_query");
        match self.get_status().await {
            Ok(reply) => {
                global_metrics().record_status_query(true);
                reply
            }
            Err(err) => {
                global_metrics().record_status_query(false);
                warn!(error = %err, "Status query failed");
                STATUS_FAILURE_REPLY.to_string()
            }
        }
    }
}

fn numeric(leg: TelemetryEndpoint, value: &TelemetryValue) -> BridgeResult<f64> {
    value.as_f64().ok_or_else(|| BridgeError::Aggregation {
        leg,
        source: DeviceError::MalformedResponse {
            endpoint: leg,
            reason: format!("expected a number, got '{}'", value),
        },
    })
}
