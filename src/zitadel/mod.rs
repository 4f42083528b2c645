//! Remote API boundary.
//!
//! This module provides the transport trait, its HTTP implementation, the
//! scoped request context adapters issue calls through, and the gateway's
//! wire messages.

mod client;
mod context;
mod transport;
pub mod types;

pub use client::{ZitadelClient, ORG_HEADER};
pub use context::{ProviderContext, ScopedClient, ORG_ID_FIELD};
pub use transport::{ApiCall, HttpMethod, Transport};

#[cfg(test)]
pub use transport::MockTransport;
