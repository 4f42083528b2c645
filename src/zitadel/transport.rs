//! Request/response boundary to the remote API.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::error::ApiError;

/// HTTP verb of a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

/// One outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Path below the service base URL, starting with `/`.
    pub path: String,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Organization scope header value; `None` for instance-level calls.
    pub org_id: Option<String>,
}

/// Sends calls to the service and classifies failures.
///
/// Implementations may retry idempotent reads; callers never do.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one call and returns the decoded JSON body.
    async fn send(&self, call: ApiCall) -> Result<Value, ApiError>;
}

impl HttpMethod {
    /// Returns true for verbs that never change remote state.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if let Some(org) = &self.org_id {
            write!(f, " (org {org})")?;
        }
        Ok(())
    }
}
