use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use salvo::prelude::*;

#[derive(Default)]
pub struct BridgeMetrics {
    inbound_messages_total: AtomicU64,
    status_queries_total: AtomicU64,
    status_failures_total: AtomicU64,
    device_events_total: AtomicU64,
    notifications_posted_total: AtomicU64,
    notifications_failed_total: AtomicU64,
    outbound_calls_total: AtomicU64,
    outbound_failures_total: AtomicU64,
    inbound_by_command: Mutex<HashMap<String, u64>>,
    device_events_by_kind: Mutex<HashMap<String, u64>>,
    outbound_by_api: Mutex<HashMap<String, u64>>,
    outbound_failures_by_api_code: Mutex<HashMap<String, u64>>,
    processing_stats: Mutex<HashMap<String, ProcessingStats>>,
}

#[derive(Default, Clone, Copy)]
struct ProcessingStats {
    count: u64,
    sum_ms: u64,
}

static GLOBAL_METRICS: OnceLock<BridgeMetrics> = OnceLock::new();

pub fn global_metrics() -> &'static BridgeMetrics {
    GLOBAL_METRICS.get_or_init(BridgeMetrics::default)
}

impl BridgeMetrics {
    pub fn record_inbound_message(&self, command: &str) {
        self.inbound_messages_total.fetch_add(1, Ordering::Relaxed);
        increment_map(&self.inbound_by_command, command.to_string());
    }

    pub fn record_status_query(&self, succeeded: bool) {
        self.status_queries_total.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.status_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_device_event(&self, kind: &str) {
        self.device_events_total.fetch_add(1, Ordering::Relaxed);
        increment_map(&self.device_events_by_kind, kind.to_string());
    }

    pub fn record_notification(&self, delivered: bool) {
        if delivered {
            self.notifications_posted_total
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.notifications_failed_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_outbound_call(&self, api: &str) {
        self.outbound_calls_total.fetch_add(1, Ordering::Relaxed);
        increment_map(&self.outbound_by_api, api.to_string());
    }

    pub fn record_outbound_failure(&self, api: &str, code: &str) {
        self.outbound_failures_total.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}|{}", api, code);
        increment_map(&self.outbound_failures_by_api_code, key);
    }

    pub fn record_processing_duration(&self, stage: &str, duration: Duration) {
        let mut guard = self.processing_stats.lock();
        let entry = guard.entry(stage.to_string()).or_default();
        entry.count = entry.count.saturating_add(1);
        entry.sum_ms = entry
            .sum_ms
            .saturating_add(duration.as_millis().min(u64::MAX as u128) as u64);
    }

    pub fn render_prometheus(&self) -> String {
        let mut body = String::new();

        counter(
            &mut body,
            "coffee_bridge_inbound_messages_total",
            "Inbound chat messages routed to a command",
            &self.inbound_messages_total,
        );
        for (command, count) in sorted_pairs(&self.inbound_by_command) {
            let _ = writeln!(
                body,
                "coffee_bridge_inbound_messages_total_by_command{{command=\"{}\"}} {}",
                escape_label(&command),
                count
            );
        }

        counter(
            &mut body,
            "coffee_bridge_status_queries_total",
            "Status queries answered",
            &self.status_queries_total,
        );
        counter(
            &mut body,
            "coffee_bridge_status_failures_total",
            "Status queries that failed to reach the device",
            &self.status_failures_total,
        );

        counter(
            &mut body,
            "coffee_bridge_device_events_total",
            "Events received from the device stream",
            &self.device_events_total,
        );
        for (kind, count) in sorted_pairs(&self.device_events_by_kind) {
            let _ = writeln!(
                body,
                "coffee_bridge_device_events_total_by_kind{{kind=\"{}\"}} {}",
                escape_label(&kind),
                count
            );
        }

        counter(
            &mut body,
            "coffee_bridge_notifications_posted_total",
            "Channel notifications delivered",
            &self.notifications_posted_total,
        );
        counter(
            &mut body,
            "coffee_bridge_notifications_failed_total",
            "Channel notifications that could not be delivered",
            &self.notifications_failed_total,
        );

        counter(
            &mut body,
            "coffee_bridge_outbound_calls_total",
            "Total outbound chat API calls",
            &self.outbound_calls_total,
        );
        for (api, count) in sorted_pairs(&self.outbound_by_api) {
            let _ = writeln!(
                body,
                "coffee_bridge_outbound_calls_total_by_api{{api=\"{}\"}} {}",
                escape_label(&api),
                count
            );
        }

        counter(
            &mut body,
            "coffee_bridge_outbound_failures_total",
            "Total outbound chat API failures",
            &self.outbound_failures_total,
        );
        for (api_code, count) in sorted_pairs(&self.outbound_failures_by_api_code) {
            let (api, code) = api_code.split_once('|').unwrap_or((api_code.as_str(), "unknown"));
            let _ = writeln!(
                body,
                "coffee_bridge_outbound_failures_total_by_api_code{{api=\"{}\",code=\"{}\"}} {}",
                escape_label(api),
                escape_label(code),
                count
            );
        }

        body.push_str(
            "# HELP coffee_bridge_processing_duration_ms_sum Total processing duration in ms\n",
        );
        body.push_str("# TYPE coffee_bridge_processing_duration_ms_sum counter\n");
        for (stage, stats) in sorted_processing(&self.processing_stats) {
            let _ = writeln!(
                body,
                "coffee_bridge_processing_duration_ms_sum{{stage=\"{}\"}} {}",
                escape_label(&stage),
                stats.sum_ms
            );
            let _ = writeln!(
                body,
                "coffee_bridge_processing_duration_ms_count{{stage=\"{}\"}} {}",
                escape_label(&stage),
                stats.count
            );
        }

        body
    }
}

pub struct ScopedTimer {
    stage: String,
    started_at: Instant,
}

impl ScopedTimer {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            started_at: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        global_metrics().record_processing_duration(&self.stage, self.started_at.elapsed());
    }
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.status_code(StatusCode::OK);
    res.render(global_metrics().render_prometheus());
}

fn counter(body: &mut String, name: &str, help: &str, value: &AtomicU64) {
    let _ = writeln!(body, "# HELP {} {}", name, help);
    let _ = writeln!(body, "# TYPE {} counter", name);
    let _ = writeln!(body, "{} {}", name, value.load(Ordering::Relaxed));
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn increment_map(map: &Mutex<HashMap<String, u64>>, key: String) {
    let mut guard = map.lock();
    let counter = guard.entry(key).or_insert(0);
    *counter = counter.saturating_add(1);
}

fn sorted_pairs(map: &Mutex<HashMap<String, u64>>) -> Vec<(String, u64)> {
    let guard = map.lock();
    let mut values: Vec<(String, u64)> = guard.iter().map(|(k, v)| (k.clone(), *v)).collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}

fn sorted_processing(
    map: &Mutex<HashMap<String, ProcessingStats>>,
) -> Vec<(String, ProcessingStats)> {
    let guard = map.lock();
    let mut values: Vec<(String, ProcessingStats)> =
        guard.iter().map(|(k, v)| (k.clone(), *v)).collect();
    values.sort_by(|a, b| a.0.cmp(&b.0));
    values
}
