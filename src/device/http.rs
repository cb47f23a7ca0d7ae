//! HTTP client for device REST configuration APIs

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::DeviceClient;
use super::types::{
    DeviceError, DeviceRequest, GroupCreateRequest, GroupCreateResponse, GroupMemberResult,
};
use crate::config::DeviceConfig;
use crate::nodes::Node;
use crate::Result;

/// Path probed by health checks
const PROBE_PATH: &str = "system/resource";

/// Longest error body excerpt carried in a [`DeviceError`]
const MAX_ERROR_BODY: usize = 200;

/// Device client speaking the REST configuration API over HTTP(S)
///
/// Every request authenticates with the node's own credentials. The client
/// holds no per-node state, so one instance is shared by all dispatch units.
#[derive(Clone)]
pub struct HttpDeviceClient {
    client: reqwest::Client,
    scheme: &'static str,
}

impl HttpDeviceClient {
    /// Create a client from device settings
    ///
    /// # Errors
    ///
    /// Returns error if the underlying HTTP client cannot be built
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(5)))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            scheme: if config.use_tls { "https" } else { "http" },
        })
    }

    fn url(&self, address: &str, path: &str) -> String {
        format!("{}://{address}/rest/{path}", self.scheme)
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        username: &str,
        password: &SecretString,
        body: Option<&serde_json::Map<String, Value>>,
    ) -> std::result::Result<Value, DeviceError> {
        let mut request = self
            .client
            .request(method.clone(), &url)
            .basic_auth(username, Some(password.expose_secret()));
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::trace!(%method, %url, "device request");

        let response = request
            .send()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        interpret_response(status, &text)
    }
}

impl std::fmt::Debug for HttpDeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDeviceClient")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn execute(
        &self,
        node: &Node,
        request: DeviceRequest,
    ) -> std::result::Result<Value, DeviceError> {
        let address = node.address();
        let (method, path, body) = match &request {
            DeviceRequest::List(kind) => (Method::GET, kind.path().to_string(), None),
            DeviceRequest::Create { kind, attributes } => {
                (Method::PUT, kind.path().to_string(), Some(attributes))
            }
            DeviceRequest::Update {
                kind,
                id,
                attributes,
            } => (Method::PATCH, format!("{}/{id}", kind.path()), Some(attributes)),
            DeviceRequest::Delete { kind, id } => {
                (Method::DELETE, format!("{}/{id}", kind.path()), None)
            }
            DeviceRequest::Probe => (Method::GET, PROBE_PATH.to_string(), None),
        };

        let value = self
            .send(
                method,
                self.url(&address, &path),
                &node.username,
                &node.password,
                body,
            )
            .await?;

        if matches!(request, DeviceRequest::List(_)) && !value.is_array() {
            return Err(DeviceError::Malformed(format!(
                "expected a list from {path}"
            )));
        }

        Ok(value)
    }

    async fn create_group(
        &self,
        request: GroupCreateRequest,
    ) -> std::result::Result<GroupCreateResponse, DeviceError> {
        let path = request.kind.path();
        let calls = request.addresses.iter().map(|address| {
            let url = self.url(address, path);
            let username = request.username.as_str();
            let password = &request.password;
            let attributes = &request.attributes;
            async move {
                let outcome = self
                    .send(Method::PUT, url, username, password, Some(attributes))
                    .await;
                GroupMemberResult {
                    address: address.clone(),
                    outcome,
                }
            }
        });

        Ok(GroupCreateResponse {
            results: join_all(calls).await,
        })
    }
}

/// Map an HTTP status and body onto the device result
fn interpret_response(status: StatusCode, body: &str) -> std::result::Result<Value, DeviceError> {
    if status == StatusCode::NOT_FOUND {
        return Err(DeviceError::NotFound(error_message(body)));
    }

    if !status.is_success() {
        return Err(DeviceError::Status {
            status: status.as_u16(),
            message: error_message(body),
        });
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(body).map_err(|e| DeviceError::Malformed(e.to_string()))
}

/// Extract the most specific message from a device error body
///
/// Devices answer errors with `{"error": 400, "message": "...", "detail": "..."}`;
/// anything else is passed through as a truncated excerpt.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["detail", "message"] {
            if let Some(text) = value.get(field).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}
