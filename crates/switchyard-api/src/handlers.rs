//! REST API handlers.
//!
//! Each handler calls into the `LifecycleController` and returns JSON
//! responses. Manual commands use the current wall-clock time.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use switchyard_cutover::{ConfigUpdate, CutoverError};
use switchyard_state::{AlertKind, epoch_secs};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn cutover_error(e: CutoverError) -> Response {
    let status = match &e {
        CutoverError::NotFound(_) => StatusCode::NOT_FOUND,
        CutoverError::Conflict(_) => StatusCode::CONFLICT,
        CutoverError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        CutoverError::State(_) => {
            error!(error = %e, "state store error while handling request");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&e.to_string(), status).into_response()
}

fn respond<T: Serialize>(result: Result<T, CutoverError>) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data).into_response(),
        Err(e) => cutover_error(e),
    }
}

// ── Cutovers ───────────────────────────────────────────────────

/// GET /api/v1/cutovers
pub async fn list_cutovers(State(state): State<ApiState>) -> impl IntoResponse {
    respond(state.controller.list_statuses().await)
}

/// PUT /api/v1/cutovers/{name}
pub async fn upsert_cutover(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(update): Json<ConfigUpdate>,
) -> impl IntoResponse {
    respond(state.controller.upsert_config(&name, update, epoch_secs()).await)
}

/// Start request body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    /// Minutes until the scheduled end; omitted or zero runs until stopped.
    pub duration_minutes: Option<u32>,
    pub auto_cutback: bool,
}

/// POST /api/v1/cutovers/{name}/start
///
/// The body is optional; without one the cutover runs until stopped.
pub async fn start_cutover(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    req: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    respond(
        state
            .controller
            .start_cutover(&name, req.duration_minutes, req.auto_cutback, epoch_secs())
            .await,
    )
}

/// POST /api/v1/cutovers/{name}/stop
pub async fn stop_cutover(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    respond(state.controller.stop_cutover(&name, epoch_secs()).await)
}

// ── History ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default = "default_alert_minutes")]
    pub minutes: u32,
    pub kind: Option<AlertKind>,
}

fn default_alert_minutes() -> u32 {
    24 * 60
}

/// GET /api/v1/cutovers/{name}/alerts
pub async fn list_alerts(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    respond(
        state
            .controller
            .recent_alerts(&name, query.kind, query.minutes, epoch_secs()),
    )
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_days")]
    pub days: u32,
}

fn default_audit_days() -> u32 {
    7
}

/// GET /api/v1/audit
pub async fn recent_audit(
    State(state): State<ApiState>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    respond(state.controller.recent_audit(query.days, epoch_secs()))
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::to_bytes;
    use serde_json::Value;
    use switchyard_cutover::{ControllerSettings, LifecycleController};
    use switchyard_remote::WorkflowState;
    use switchyard_remote::testing::{RecordingNotifier, ScriptedWorkflowClient};
    use switchyard_state::{AlertRecord, AuditAction, StateStore};

    struct Fixture {
        state: ApiState,
        store: StateStore,
        workflows: Arc<ScriptedWorkflowClient>,
    }

    fn fixture() -> Fixture {
        let store = StateStore::open_in_memory().unwrap();
        let workflows = Arc::new(ScriptedWorkflowClient::new());
        for (wf, state) in [
            ("orders-v4", WorkflowState::Disabled),
            ("orders-v3", WorkflowState::Enabled),
            ("orders-failover", WorkflowState::Disabled),
        ] {
            workflows.set_remote_state(wf, state);
        }
        let controller = Arc::new(LifecycleController::new(
            store.clone(),
            workflows.clone(),
            Arc::new(RecordingNotifier::new()),
            ControllerSettings::default(),
        ));
        Fixture {
            state: ApiState { controller },
            store,
            workflows,
        }
    }

    fn orders_config() -> ConfigUpdate {
        ConfigUpdate {
            resource_scope: Some("rg-prod".to_string()),
            v4_workflow: Some("orders-v4".to_string()),
            v3_workflow: Some("orders-v3".to_string()),
            failover_workflow: Some("orders-failover".to_string()),
            ..ConfigUpdate::default()
        }
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn configure(f: &Fixture) {
        let resp = upsert_cutover(
            State(f.state.clone()),
            Path("orders".to_string()),
            Json(orders_config()),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_cutovers_empty() {
        let f = fixture();
        let resp = list_cutovers(State(f.state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn upsert_then_list_shows_remote_states() {
        let f = fixture();
        configure(&f).await;

        let resp = list_cutovers(State(f.state)).await.into_response();
        let body = body_json(resp).await;
        let cutover = &body["data"][0];
        assert_eq!(cutover["name"], "orders");
        assert_eq!(cutover["phase"], "Inactive");
        assert_eq!(cutover["v3_state"], "Enabled");
        assert_eq!(cutover["v4_state"], "Disabled");
    }

    #[tokio::test]
    async fn upsert_invalid_threshold_is_bad_request() {
        let f = fixture();
        let resp = upsert_cutover(
            State(f.state),
            Path("orders".to_string()),
            Json(ConfigUpdate {
                failure_threshold: Some(0),
                ..ConfigUpdate::default()
            }),
        )
        .await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_and_stop_cutover() {
        let f = fixture();
        configure(&f).await;

        let resp = start_cutover(
            State(f.state.clone()),
            Path("orders".to_string()),
            Some(Json(StartRequest {
                duration_minutes: Some(120),
                auto_cutback: true,
            })),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["phase"], "Active");
        assert_eq!(body["data"]["actor"], "API");
        assert_eq!(f.workflows.state_of("orders-v4"), Some(WorkflowState::Enabled));

        let resp = stop_cutover(State(f.state.clone()), Path("orders".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
        assert_eq!(f.workflows.state_of("orders-v3"), Some(WorkflowState::Enabled));

        // Already stopped.
        let resp = stop_cutover(State(f.state), Path("orders".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn start_without_body_runs_until_stopped() {
        let f = fixture();
        configure(&f).await;

        let resp = start_cutover(State(f.state.clone()), Path("orders".to_string()), None)
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let schedule = f.store.get_schedule("orders").unwrap().unwrap();
        assert!(schedule.is_active);
        assert_eq!(schedule.scheduled_end, None);
        assert!(!schedule.auto_cutback);
    }

    #[tokio::test]
    async fn start_unknown_cutover_is_not_found() {
        let f = fixture();
        let resp = start_cutover(
            State(f.state),
            Path("ghost".to_string()),
            Some(Json(StartRequest::default())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn start_reports_remote_failures() {
        let f = fixture();
        configure(&f).await;
        f.workflows.fail_set_state("orders-v3");

        let resp = start_cutover(
            State(f.state),
            Path("orders".to_string()),
            Some(Json(StartRequest::default())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let failures = body["data"]["remote_failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn alerts_filtered_by_kind() {
        let f = fixture();
        configure(&f).await;
        let now = epoch_secs();
        for kind in [AlertKind::Failure, AlertKind::Cutback] {
            f.store
                .append_alert(&AlertRecord {
                    cutover: "orders".to_string(),
                    kind,
                    message: kind.to_string(),
                    timestamp: now - 60,
                    delivery_id: None,
                })
                .unwrap();
        }

        let resp = list_alerts(
            State(f.state),
            Path("orders".to_string()),
            Query(AlertsQuery {
                minutes: 30,
                kind: Some(AlertKind::Cutback),
            }),
        )
        .await
        .into_response();
        let body = body_json(resp).await;
        let alerts = body["data"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["kind"], "Cutback");
    }

    #[tokio::test]
    async fn audit_lists_config_changes() {
        let f = fixture();
        configure(&f).await;

        let resp = recent_audit(State(f.state), Query(AuditQuery { days: 7 }))
            .await
            .into_response();
        let body = body_json(resp).await;
        let records = body["data"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0]["action"],
            serde_json::to_value(AuditAction::ConfigUpdated).unwrap()
        );
        assert_eq!(records[0]["actor"], "API");
    }

    #[tokio::test]
    async fn healthz_ok() {
        let resp = healthz().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
