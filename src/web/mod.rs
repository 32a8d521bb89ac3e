pub mod health;
pub mod metrics;

pub use health::{health_endpoint, ready_endpoint};
pub use metrics::{ScopedTimer, global_metrics, metrics_endpoint};
