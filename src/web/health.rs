use salvo::prelude::*;

use crate::bridge::{BridgePhase, PhaseTracker};

#[handler]
pub async fn health_endpoint(res: &mut Response) {
    res.status_code(StatusCode::OK);
    res.render(Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })));
}

/// Ready once the device event subscription is listening.
#[handler]
pub async fn ready_endpoint(depot: &mut Depot, res: &mut Response) {
    let phase = depot
        .obtain::<PhaseTracker>()
        .map(PhaseTracker::get)
        .unwrap_or(BridgePhase::Uninitialized);
    let ready = phase.is_subscribed();

    res.status_code(if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    });
    res.render(Json(serde_json::json!({
        "ready": ready,
        "subscription": phase.as_str(),
    })));
}
