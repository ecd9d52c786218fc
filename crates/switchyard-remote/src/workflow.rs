//! Workflow management API client.
//!
//! Reads and toggles the enabled state of named workflows and counts their
//! recent runs. The engine only depends on the [`WorkflowClient`] trait;
//! [`HttpWorkflowClient`] talks JSON over HTTPS to the management API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::WorkflowsConfig;

use crate::error::{RemoteError, RemoteResult};
use crate::token::TokenCache;

/// Enabled state of a remote workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Enabled,
    Disabled,
}

impl WorkflowState {
    fn action(&self) -> &'static str {
        match self {
            WorkflowState::Enabled => "enable",
            WorkflowState::Disabled => "disable",
        }
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowState::Enabled => f.write_str("Enabled"),
            WorkflowState::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Run counts for one workflow over a trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: u64,
    pub failed: u64,
}

/// Remote workflow-state capability.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn get_state(&self, scope: &str, workflow: &str) -> RemoteResult<WorkflowState>;

    async fn set_state(
        &self,
        scope: &str,
        workflow: &str,
        desired: WorkflowState,
    ) -> RemoteResult<()>;

    async fn recent_runs(
        &self,
        scope: &str,
        workflow: &str,
        window_minutes: u32,
    ) -> RemoteResult<RunCounts>;
}

#[derive(Debug)]
enum Auth {
    None,
    Static(String),
    ClientCredentials(TokenCache),
}

/// [`WorkflowClient`] over the workflow management REST API.
///
/// Routes, relative to `base_url`:
///
/// | Method | Path |
/// |---|---|
/// | GET | `/scopes/{scope}/workflows/{name}` |
/// | POST | `/scopes/{scope}/workflows/{name}/enable` and `/disable` |
/// | GET | `/scopes/{scope}/workflows/{name}/runs?windowMinutes=N` |
#[derive(Debug)]
pub struct HttpWorkflowClient {
    base_url: String,
    auth: Auth,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct StateResponse {
    state: String,
}

#[derive(Deserialize)]
struct RunsResponse {
    #[serde(default)]
    value: Vec<RunEntry>,
}

#[derive(Deserialize)]
struct RunEntry {
    status: String,
}

impl HttpWorkflowClient {
    pub fn from_config(config: &WorkflowsConfig) -> RemoteResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| RemoteError::Config("workflows.base_url is not set".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let auth = match (&config.token_url, &config.api_token) {
            (Some(token_url), _) => Auth::ClientCredentials(TokenCache::new(
                client.clone(),
                token_url.clone(),
                config.client_id.clone().unwrap_or_default(),
                config.client_secret.clone().unwrap_or_default(),
            )),
            (None, Some(token)) => Auth::Static(token.clone()),
            (None, None) => Auth::None,
        };

        Ok(Self {
            base_url,
            auth,
            client,
        })
    }

    fn workflow_url(&self, scope: &str, workflow: &str) -> String {
        format!(
            "{}/scopes/{}/workflows/{}",
            self.base_url,
            scope.trim_matches('/'),
            workflow
        )
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> RemoteResult<reqwest::RequestBuilder> {
        Ok(match &self.auth {
            Auth::None => request,
            Auth::Static(token) => request.bearer_auth(token),
            Auth::ClientCredentials(cache) => request.bearer_auth(cache.token().await?),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> RemoteResult<reqwest::Response> {
        let response = self.authorize(request).await?.send().await?;
        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED
                && let Auth::ClientCredentials(cache) = &self.auth
            {
                cache.invalidate().await;
            }
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl WorkflowClient for HttpWorkflowClient {
    async fn get_state(&self, scope: &str, workflow: &str) -> RemoteResult<WorkflowState> {
        let url = self.workflow_url(scope, workflow);
        let response = self.send(self.client.get(&url), &url).await?;
        let body: StateResponse = response.json().await?;
        match body.state.as_str() {
            "Enabled" => Ok(WorkflowState::Enabled),
            "Disabled" => Ok(WorkflowState::Disabled),
            other => Err(RemoteError::Decode(format!(
                "unknown workflow state {other:?} for {workflow}"
            ))),
        }
    }

    async fn set_state(
        &self,
        scope: &str,
        workflow: &str,
        desired: WorkflowState,
    ) -> RemoteResult<()> {
        let url = format!("{}/{}", self.workflow_url(scope, workflow), desired.action());
        self.send(self.client.post(&url), &url).await?;
        debug!(%scope, %workflow, state = %desired, "workflow state set");
        Ok(())
    }

    async fn recent_runs(
        &self,
        scope: &str,
        workflow: &str,
        window_minutes: u32,
    ) -> RemoteResult<RunCounts> {
        let url = format!("{}/runs", self.workflow_url(scope, workflow));
        let request = self
            .client
            .get(&url)
            .query(&[("windowMinutes", window_minutes)]);
        let response = self.send(request, &url).await?;
        let body: RunsResponse = response.json().await?;
        Ok(count_runs(&body.value))
    }
}

fn count_runs(runs: &[RunEntry]) -> RunCounts {
    RunCounts {
        total: runs.len() as u64,
        failed: runs.iter().filter(|r| r.status == "Failed").count() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<String>>>;

    async fn spawn_api(calls: Calls) -> String {
        let enable_calls = calls.clone();
        let disable_calls = calls.clone();
        let router = Router::new()
            .route(
                "/api/scopes/{scope}/workflows/{name}",
                get(|Path((_, name)): Path<(String, String)>, headers: HeaderMap| async move {
                    if headers.get("authorization").map(|v| v.as_bytes()) != Some(b"Bearer tkn") {
                        return (StatusCode::UNAUTHORIZED, Json(json!({})));
                    }
                    match name.as_str() {
                        "orders-v4" => (StatusCode::OK, Json(json!({"state": "Enabled"}))),
                        "weird" => (StatusCode::OK, Json(json!({"state": "Suspended"}))),
                        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "no such workflow"}))),
                    }
                }),
            )
            .route(
                "/api/scopes/{scope}/workflows/{name}/enable",
                post(move |Path((_, name)): Path<(String, String)>| {
                    enable_calls.lock().unwrap().push(format!("enable {name}"));
                    async move { StatusCode::OK }
                }),
            )
            .route(
                "/api/scopes/{scope}/workflows/{name}/disable",
                post(move |Path((_, name)): Path<(String, String)>| {
                    disable_calls.lock().unwrap().push(format!("disable {name}"));
                    async move { StatusCode::INTERNAL_SERVER_ERROR }
                }),
            )
            .route(
                "/api/scopes/{scope}/workflows/{name}/runs",
                get(|Query(q): Query<std::collections::HashMap<String, String>>| async move {
                    assert_eq!(q.get("windowMinutes").map(String::as_str), Some("30"));
                    Json(json!({"value": [
                        {"status": "Succeeded"},
                        {"status": "Failed"},
                        {"status": "Running"},
                        {"status": "Failed"}
                    ]}))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn client_for(base_url: String) -> HttpWorkflowClient {
        HttpWorkflowClient::from_config(&WorkflowsConfig {
            base_url: Some(base_url),
            api_token: Some("tkn".to_string()),
            ..WorkflowsConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn get_state_parses_enabled() {
        let client = client_for(spawn_api(Calls::default()).await);
        let state = client.get_state("rg-prod", "orders-v4").await.unwrap();
        assert_eq!(state, WorkflowState::Enabled);
    }

    #[tokio::test]
    async fn get_state_unknown_value_is_decode_error() {
        let client = client_for(spawn_api(Calls::default()).await);
        let err = client.get_state("rg-prod", "weird").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn get_state_missing_workflow_reports_status() {
        let client = client_for(spawn_api(Calls::default()).await);
        let err = client.get_state("rg-prod", "nope").await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn set_state_posts_action_and_surfaces_failures() {
        let calls = Calls::default();
        let client = client_for(spawn_api(calls.clone()).await);

        client
            .set_state("rg-prod", "orders-v4", WorkflowState::Enabled)
            .await
            .unwrap();
        let err = client
            .set_state("rg-prod", "orders-v3", WorkflowState::Disabled)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 500, .. }));

        let calls = calls.lock().unwrap();
        assert_eq!(*calls, ["enable orders-v4", "disable orders-v3"]);
    }

    #[tokio::test]
    async fn recent_runs_counts_failed() {
        let client = client_for(spawn_api(Calls::default()).await);
        let runs = client.recent_runs("rg-prod", "orders-v4", 30).await.unwrap();
        assert_eq!(runs, RunCounts { total: 4, failed: 2 });
    }

    #[test]
    fn from_config_requires_base_url() {
        let err = HttpWorkflowClient::from_config(&WorkflowsConfig::default()).unwrap_err();
        assert!(matches!(err, RemoteError::Config(_)));
    }

    #[test]
    fn workflow_url_trims_slashes() {
        let client = client_for("https://wf.example/api/".to_string());
        assert_eq!(
            client.workflow_url("/subs/1/rg/prod/", "orders-v4"),
            "https://wf.example/api/scopes/subs/1/rg/prod/workflows/orders-v4"
        );
    }
}
