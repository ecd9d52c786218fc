//! switchyard-api — REST API for Switchyard.
//!
//! Exposes the cutover controller's operator surface over HTTP. Every
//! response uses the `{success, data?, error?}` envelope.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/cutovers` | Status of every cutover |
//! | PUT | `/api/v1/cutovers/{name}` | Create or update a cutover's config |
//! | POST | `/api/v1/cutovers/{name}/start` | Start (or restart) a cutover |
//! | POST | `/api/v1/cutovers/{name}/stop` | Stop an active cutover |
//! | GET | `/api/v1/cutovers/{name}/alerts` | Recent alerts (`?minutes=&kind=`) |
//! | GET | `/api/v1/audit` | Audit trail (`?days=`, default 7) |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use switchyard_cutover::LifecycleController;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<LifecycleController>,
}

/// Build the complete API router.
pub fn build_router(controller: Arc<LifecycleController>) -> Router {
    let api_state = ApiState { controller };

    let api_routes = Router::new()
        .route("/cutovers", get(handlers::list_cutovers))
        .route("/cutovers/{name}", put(handlers::upsert_cutover))
        .route("/cutovers/{name}/start", post(handlers::start_cutover))
        .route("/cutovers/{name}/stop", post(handlers::stop_cutover))
        .route("/cutovers/{name}/alerts", get(handlers::list_alerts))
        .route("/audit", get(handlers::recent_audit))
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
