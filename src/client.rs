//! HTTP client facade with builder pattern.
//!
//! Sends one GET over a caller-chosen [`Transport`] and reports what
//! happened as a [`RequestResult`], including failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use dialscope::{HttpClient, Transport, TransportVariant, TargetEndpoint, Deadline};
//!
//! let client = HttpClient::builder().user_agent("checker/1.0").build();
//! let transport = Transport::new(TransportVariant::QuicDefault, &Default::default());
//! let endpoint = TargetEndpoint::parse("https://cloudflare-quic.com/")?;
//!
//! let result = client.send(&transport, &endpoint, &NullObserver, &Deadline::never()).await;
//! println!("{:?} over {:?}", result.status, result.protocol);
//! ```

use crate::base::deadline::Deadline;
use crate::base::endpoint::TargetEndpoint;
use crate::http::streamfactory::HttpStreamFactory;
use crate::http::transaction::{HttpNetworkTransaction, TransactionOptions};
use crate::http::RequestResult;
use crate::observer::ConnectionObserver;
use crate::socket::pool::ConnectionPool;
use crate::socket::transport::Transport;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("dialscope/", env!("CARGO_PKG_VERSION"));

/// Client-wide settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reuse pooled connections for the same transport and endpoint.
    pub reuse_connections: bool,
    pub user_agent: String,
    /// Maximum accepted body size; `None` means unlimited.
    pub max_body_bytes: Option<usize>,
    /// Applied on top of the caller's deadline.
    pub timeout: Option<Duration>,
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reuse_connections: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: Some(16 * 1024 * 1024),
            timeout: None,
            max_idle_per_host: 6,
        }
    }
}

/// HTTP client that sends one GET per call over a chosen transport.
///
/// Use [`HttpClient::builder()`] to configure and create a client.
#[derive(Clone)]
pub struct HttpClient {
    factory: Arc<HttpStreamFactory>,
    config: ClientConfig,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let pool = Arc::new(ConnectionPool::with_max_idle(config.max_idle_per_host));
        Self { factory: Arc::new(HttpStreamFactory::new(pool)), config }
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one `GET` for `endpoint` over `transport`.
    ///
    /// Never fails outright: errors land in [`RequestResult::error`]. A
    /// pooled connection is used when one is alive, in which case
    /// `observer` sees no connection events.
    pub async fn send(
        &self,
        transport: &Transport,
        endpoint: &TargetEndpoint,
        observer: &dyn ConnectionObserver,
        deadline: &Deadline,
    ) -> RequestResult {
        let deadline = match self.config.timeout {
            Some(timeout) => deadline.tightened(timeout),
            None => deadline.clone(),
        };
        let options = TransactionOptions {
            user_agent: &self.config.user_agent,
            reuse_connections: self.config.reuse_connections,
            max_body_bytes: self.config.max_body_bytes,
        };

        let mut txn =
            HttpNetworkTransaction::new(&self.factory, transport, endpoint, observer, options);
        // The error is recorded in the result.
        let _ = txn.start(&deadline).await;
        txn.into_result()
    }

    /// Drop every pooled connection.
    pub fn close_idle(&self) {
        self.factory.pool().clear();
    }
}

/// Builder for creating an [`HttpClient`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Enable or disable connection reuse.
    pub fn reuse_connections(mut self, reuse: bool) -> Self {
        self.config.reuse_connections = reuse;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn max_body_bytes(mut self, max: Option<usize>) -> Self {
        self.config.max_body_bytes = max;
        self
    }

    /// Set per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.config.max_idle_per_host = max;
        self
    }

    pub fn build(self) -> HttpClient {
        HttpClient::with_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let client = HttpClient::builder()
            .reuse_connections(false)
            .user_agent("checker/1.0")
            .timeout(Duration::from_secs(3))
            .build();
        assert!(!client.config().reuse_connections);
        assert_eq!(client.config().user_agent, "checker/1.0");
        assert_eq!(client.config().timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_default_user_agent() {
        assert!(HttpClient::new().config().user_agent.starts_with("dialscope/"));
    }
}
