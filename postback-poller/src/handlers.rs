use std::future::ready;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use postback_common::health::HealthRegistry;
use postback_common::metrics::metrics_router;

pub fn app(liveness: HealthRegistry, recorder_handle: Option<PrometheusHandle>) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    match recorder_handle {
        Some(handle) => router.merge(metrics_router(handle)),
        None => router,
    }
}

pub async fn index() -> &'static str {
    "lead payouts postback poller"
}
