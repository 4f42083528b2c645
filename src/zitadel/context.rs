//! Provider context and per-operation scoped request context.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::ApiError;
use crate::resource::DeclaredState;

use super::transport::{ApiCall, HttpMethod, Transport};

/// Declared-state field carrying the organization scope.
pub const ORG_ID_FIELD: &str = "org_id";

/// Dependencies every adapter is constructed with.
#[derive(Clone)]
pub struct ProviderContext {
    transport: Arc<dyn Transport>,
    default_org_id: Option<String>,
    cancel: CancellationToken,
}

/// Call context for one operation, carrying its resolved organization scope.
#[derive(Clone)]
pub struct ScopedClient {
    transport: Arc<dyn Transport>,
    org_id: Option<String>,
    cancel: CancellationToken,
}

impl ProviderContext {
    /// Creates a context around a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            default_org_id: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the caller's default organization.
    #[must_use]
    pub fn with_default_org(mut self, org_id: Option<String>) -> Self {
        self.default_org_id = org_id.filter(|id| !id.is_empty());
        self
    }

    /// Uses the given token to cancel in-flight calls.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The caller's default organization, if any.
    #[must_use]
    pub fn default_org_id(&self) -> Option<&str> {
        self.default_org_id.as_deref()
    }

    /// The token that cancels every call made through this context.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Call context for an organization-level entity.
    ///
    /// An explicit `org_id` in declared state wins; otherwise the default
    /// organization applies.
    #[must_use]
    pub fn org_scope(&self, declared: &DeclaredState) -> ScopedClient {
        let org_id = declared
            .get(ORG_ID_FIELD)
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
            .map(String::from)
            .or_else(|| self.default_org_id.clone());
        self.scoped(org_id)
    }

    /// Call context for an instance-level entity.
    #[must_use]
    pub fn instance_scope(&self) -> ScopedClient {
        self.scoped(None)
    }

    fn scoped(&self, org_id: Option<String>) -> ScopedClient {
        ScopedClient {
            transport: Arc::clone(&self.transport),
            org_id,
            cancel: self.cancel.clone(),
        }
    }
}

impl ScopedClient {
    /// The organization every call is scoped to.
    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    /// Issues a `GET` and decodes the response.
    ///
    /// # Errors
    ///
    /// Returns the transport's error, [`ApiError::Cancelled`], or an
    /// invalid-response error if decoding fails.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let value = self.send(HttpMethod::Get, path, None).await?;
        decode(value)
    }

    /// Issues a `POST` with a JSON body and decodes the response.
    ///
    /// # Errors
    ///
    /// See [`ScopedClient::get`].
    pub async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self.send(HttpMethod::Post, path, Some(encode(body)?)).await?;
        decode(value)
    }

    /// Issues a `PUT` with a JSON body and decodes the response.
    ///
    /// # Errors
    ///
    /// See [`ScopedClient::get`].
    pub async fn put<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self.send(HttpMethod::Put, path, Some(encode(body)?)).await?;
        decode(value)
    }

    /// Issues a `DELETE`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error or [`ApiError::Cancelled`].
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(HttpMethod::Delete, path, None).await.map(|_| ())
    }

    async fn send(&self, method: HttpMethod, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let call = ApiCall {
            method,
            path: path.to_string(),
            body,
            org_id: self.org_id.clone(),
        };
        trace!("Sending {call}");

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ApiError::Cancelled),
            result = self.transport.send(call) => result,
        }
    }
}

fn encode<B: Serialize>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body)
        .map_err(|e| ApiError::invalid_response(format!("failed to encode request: {e}")))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::invalid_response(format!("failed to decode response: {e}")))
}

impl fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("default_org_id", &self.default_org_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for ScopedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedClient")
            .field("org_id", &self.org_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zitadel::transport::MockTransport;
    use serde_json::json;
    use std::time::Duration;

    fn context_with(mock: MockTransport) -> ProviderContext {
        ProviderContext::new(Arc::new(mock)).with_default_org(Some(String::from("100")))
    }

    #[tokio::test]
    async fn test_explicit_org_wins_over_default() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|call| call.org_id.as_deref() == Some("200"))
            .times(1)
            .returning(|_| Ok(json!({})));

        let ctx = context_with(mock);
        let declared = DeclaredState::new().with(ORG_ID_FIELD, "200");
        let scoped = ctx.org_scope(&declared);

        assert_eq!(scoped.org_id(), Some("200"));
        scoped.delete("/management/v1/users/1/keys/2").await.expect("delete");
    }

    #[tokio::test]
    async fn test_default_org_when_undeclared() {
        let ctx = context_with(MockTransport::new());
        assert_eq!(ctx.org_scope(&DeclaredState::new()).org_id(), Some("100"));
        assert_eq!(ctx.instance_scope().org_id(), None);
    }

    #[tokio::test]
    async fn test_cancelled_context_issues_no_call() {
        let mut mock = MockTransport::new();
        mock.expect_send().never();

        let ctx = context_with(mock);
        ctx.cancellation_token().cancel();

        let result: Result<Value, ApiError> = ctx.instance_scope().get("/admin/v1/members").await;
        assert_eq!(result, Err(ApiError::Cancelled));
    }

    struct SlowTransport;

    #[async_trait::async_trait]
    impl Transport for SlowTransport {
        async fn send(&self, _call: ApiCall) -> Result<Value, ApiError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_call() {
        let token = CancellationToken::new();
        let ctx = ProviderContext::new(Arc::new(SlowTransport)).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            ctx.instance_scope().get::<Value>("/admin/v1/idps/1"),
        )
        .await
        .expect("cancellation should end the call before the timeout");

        assert_eq!(result, Err(ApiError::Cancelled));
        canceller.await.expect("canceller task");
    }
}
