//! powercycle-api — HTTP surface of the cycling daemon.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/dashboard` | Latest tick status |
//! | GET | `/api/v1/devices` | Ledger rows in fairness order |
//! | GET | `/api/v1/devices/{id}` | One ledger row |
//! | POST | `/api/v1/devices/{id}` | Register a device |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use powercycle_ledger::DeviceLedger;
use powercycle_metrics::TickMetrics;
use powercycle_scheduler::CommandCache;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<dyn DeviceLedger>,
    pub cache: CommandCache,
    pub metrics: Arc<TickMetrics>,
}

/// Build the complete API router (REST + dashboard + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/devices", get(handlers::list_devices))
        .route(
            "/devices/{id}",
            get(handlers::get_device).post(handlers::register_device),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/dashboard", get(handlers::dashboard))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
