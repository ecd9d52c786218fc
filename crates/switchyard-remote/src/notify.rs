//! Text-message notification channel.
//!
//! Alerts go to a single, fixed destination through an SMS gateway that
//! accepts `{"to": ..., "body": ...}` and answers with a message id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use switchyard_core::NotifyConfig;

use crate::error::{RemoteError, RemoteResult};

/// Notification capability. Returns the gateway's delivery id on success.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> RemoteResult<String>;
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    to: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct GatewayReceipt {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// [`Notifier`] that posts JSON to an SMS gateway webhook.
#[derive(Debug)]
pub struct SmsWebhookNotifier {
    url: String,
    destination: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl SmsWebhookNotifier {
    pub fn from_config(config: &NotifyConfig) -> RemoteResult<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| RemoteError::Config("notify.url is not set".to_string()))?;
        let destination = config
            .destination
            .clone()
            .ok_or_else(|| RemoteError::Config("notify.destination is not set".to_string()))?;
        Ok(Self {
            url,
            destination,
            auth_token: config.auth_token.clone(),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Notifier for SmsWebhookNotifier {
    async fn send(&self, message: &str) -> RemoteResult<String> {
        let mut request = self.client.post(&self.url).json(&OutgoingMessage {
            to: &self.destination,
            body: message,
        });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let receipt: GatewayReceipt = response.json().await?;
        let id = receipt
            .sid
            .or(receipt.id)
            .ok_or_else(|| RemoteError::Decode("gateway receipt has no message id".to_string()))?;
        debug!(delivery_id = %id, "notification delivered");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Json;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{Value, json};

    async fn spawn_gateway() -> String {
        let router = Router::new()
            .route(
                "/ok",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(body["to"], "+15550100");
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({"sid": format!("SM-{}", body["body"].as_str().unwrap().len()), "auth": auth}))
                }),
            )
            .route("/plain-id", post(|| async { Json(json!({"id": "msg-7"})) }))
            .route("/no-id", post(|| async { Json(json!({"queued": true})) }))
            .route(
                "/down",
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn notifier(url: String) -> SmsWebhookNotifier {
        SmsWebhookNotifier::from_config(&NotifyConfig {
            url: Some(url),
            destination: Some("+15550100".to_string()),
            auth_token: Some("gw-token".to_string()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_sid_as_delivery_id() {
        let base = spawn_gateway().await;
        let id = notifier(format!("{base}/ok")).send("hello").await.unwrap();
        assert_eq!(id, "SM-5");
    }

    #[tokio::test]
    async fn falls_back_to_id_field() {
        let base = spawn_gateway().await;
        let id = notifier(format!("{base}/plain-id")).send("hello").await.unwrap();
        assert_eq!(id, "msg-7");
    }

    #[tokio::test]
    async fn receipt_without_id_is_an_error() {
        let base = spawn_gateway().await;
        let err = notifier(format!("{base}/no-id")).send("hello").await.unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[tokio::test]
    async fn gateway_error_status_is_reported() {
        let base = spawn_gateway().await;
        let err = notifier(format!("{base}/down")).send("hello").await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 503, .. }));
    }

    #[test]
    fn from_config_requires_destination() {
        let err = SmsWebhookNotifier::from_config(&NotifyConfig {
            url: Some("https://sms.example".to_string()),
            destination: None,
            auth_token: None,
        })
        .unwrap_err();
        assert!(matches!(err, RemoteError::Config(_)));
    }
}
