//! HTTP transport for the ZITADEL REST gateway.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::ProviderSettings;
use crate::error::{ApiError, Result};

use super::transport::{ApiCall, HttpMethod, Transport};

/// Header that scopes a call to an organization.
pub const ORG_HEADER: &str = "x-zitadel-orgid";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum attempts for idempotent reads that fail before a response.
const MAX_READ_ATTEMPTS: u32 = 3;

/// Delay between read retries in milliseconds.
const RETRY_DELAY_MS: u64 = 500;

/// gRPC status codes the gateway reports in error bodies.
mod grpc {
    pub const INVALID_ARGUMENT: i64 = 3;
    pub const NOT_FOUND: i64 = 5;
    pub const ALREADY_EXISTS: i64 = 6;
    pub const PERMISSION_DENIED: i64 = 7;
    pub const UNAUTHENTICATED: i64 = 16;
}

/// Bearer-authenticated client for the management and admin gateways.
#[derive(Debug, Clone)]
pub struct ZitadelClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
    /// Access token.
    token: String,
    /// Attempts for reads that fail at the network level.
    read_attempts: u32,
}

/// Error body of the gateway.
#[derive(Debug, Default, Deserialize)]
struct GatewayStatus {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl ZitadelClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            read_attempts: MAX_READ_ATTEMPTS,
        })
    }

    /// Creates a client from provider settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_settings(settings: &ProviderSettings, token: &str) -> Result<Self> {
        Self::with_timeout(&settings.base_url(), token, settings.timeout_secs)
    }

    /// Sets how many times a read is attempted on network failure.
    #[must_use]
    pub const fn with_read_attempts(mut self, attempts: u32) -> Self {
        self.read_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// The base URL calls are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send_once(&self, call: &ApiCall) -> std::result::Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, call.path);
        trace!("{} {url}", call.method);

        let mut request = match call.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        }
        .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
        .header(header::ACCEPT, "application/json");

        if let Some(org_id) = &call.org_id {
            request = request.header(ORG_HEADER, org_id);
        }
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(classify(status, &body));
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::invalid_response(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl Transport for ZitadelClient {
    async fn send(&self, call: ApiCall) -> std::result::Result<Value, ApiError> {
        let attempts = if call.method.is_read_only() { self.read_attempts } else { 1 };
        let mut attempt = 1;

        loop {
            match self.send_once(&call).await {
                Err(err) if err.is_network() && attempt < attempts => {
                    warn!("Attempt {attempt}/{attempts} for {call} failed: {err}");
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!("{call} failed: {err}");
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

/// Maps an unsuccessful response to the API error taxonomy.
///
/// The HTTP status and the gateway's gRPC code are both consulted, so a
/// `code: 5` body is NotFound whatever status carried it.
fn classify(status: StatusCode, body: &str) -> ApiError {
    let parsed: GatewayStatus = serde_json::from_str(body).unwrap_or_default();
    let message = if parsed.message.is_empty() {
        body.trim().to_string()
    } else {
        parsed.message
    };

    match (status, parsed.code) {
        (StatusCode::NOT_FOUND, _) | (_, Some(grpc::NOT_FOUND)) => ApiError::NotFound { message },
        (StatusCode::UNAUTHORIZED, _) | (_, Some(grpc::UNAUTHENTICATED)) => {
            ApiError::Unauthenticated { message }
        }
        (StatusCode::FORBIDDEN, _) | (_, Some(grpc::PERMISSION_DENIED)) => {
            ApiError::PermissionDenied { message }
        }
        (StatusCode::CONFLICT, _) | (_, Some(grpc::ALREADY_EXISTS)) => {
            ApiError::AlreadyExists { message }
        }
        (StatusCode::BAD_REQUEST, _) | (_, Some(grpc::INVALID_ARGUMENT)) => {
            ApiError::InvalidArgument { message }
        }
        (status, code) => ApiError::RequestFailed {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        assert!(classify(StatusCode::NOT_FOUND, "").is_not_found());
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, r#"{"code":7,"message":"No matching permissions found"}"#),
            ApiError::PermissionDenied { message } if message == "No matching permissions found"
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "upstream down"),
            ApiError::RequestFailed { status: 502, code: None, .. }
        ));
    }

    #[test]
    fn test_classify_by_gateway_code() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            r#"{"code":5,"message":"Errors.User.NotFound","details":[]}"#,
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_base_url_is_normalised() {
        let client = ZitadelClient::new("https://example.zitadel.cloud/", "token").expect("client");
        assert_eq!(client.base_url(), "https://example.zitadel.cloud");
    }
}
