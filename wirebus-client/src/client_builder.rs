//! Client builder for configuring reconnection and other options
//!
//! The `ClientBuilder` provides a fluent API for configuring client behavior
//! before connecting. It allows you to:
//! - Apply a [`ClientConfig`] (backoff and request timeout settings)
//! - Replace or disable the reconnection strategy
//! - Plug in the endpoint resolver and token provider
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use wirebus_client::{ClientBuilder, ClientConfig};
//!
//! # async fn example() -> wirebus_core::Result<()> {
//! // Lazy: nothing is opened until connect() or the first subscribe()
//! let client = ClientBuilder::new("ws://localhost:8080/bus")
//!     .config(ClientConfig::from_env()?)
//!     .with_token_provider(|| std::env::var("BUS_TOKEN").ok())
//!     .build()?;
//!
//! // Eager: connect and wait for the first successful handshake
//! let client2 = ClientBuilder::new("ws://localhost:8080/bus")
//!     .with_default_observability()
//!     .service_name("dashboard")
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::client::{Client, ClientInner};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::connection_state::ConnectionManager;
use crate::endpoint::{validate_url, EndpointResolver, TokenProvider};
use crate::metrics::ClientMetrics;
use crate::reconnect::{NoReconnect, ReconnectionStrategy};
use crate::registry::SubscriptionRegistry;
use crate::request::RequestManager;
use crate::router::Router;
use crate::stream::StreamTable;
use std::sync::Arc;
use wirebus_core::{Error, ObservabilityConfig, Result};

/// Builder for configuring and creating a [`Client`]
pub struct ClientBuilder {
    url: Option<String>,
    endpoint: Arc<dyn EndpointResolver>,
    tokens: Option<Arc<dyn TokenProvider>>,
    config: ClientConfig,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    enable_reconnect: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a new client builder for a fixed URL
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            endpoint: Arc::new(url.clone()),
            url: Some(url),
            tokens: None,
            config: ClientConfig::default(),
            reconnect_strategy: None,
            enable_reconnect: true,
            observability_config: None,
            service_name: None,
        }
    }

    /// Resolve the URL on every connection attempt instead
    pub fn with_endpoint_resolver(mut self, resolver: impl EndpointResolver + 'static) -> Self {
        self.endpoint = Arc::new(resolver);
        self.url = None;
        self
    }

    /// Attach a bearer token to every handshake
    pub fn with_token_provider(mut self, tokens: impl TokenProvider + 'static) -> Self {
        self.tokens = Some(Arc::new(tokens));
        self
    }

    /// Use these reconnection and request settings
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Reconnect with the given strategy instead of the configured backoff
    pub fn with_reconnect(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = Some(strategy);
        self.enable_reconnect = true;
        self
    }

    /// Never reconnect; an unplanned close goes straight to `Failed`
    pub fn without_reconnect(mut self) -> Self {
        self.enable_reconnect = false;
        self.reconnect_strategy = None;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the client without opening a connection
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        if let Some(ref url) = self.url {
            validate_url(url)?;
        }

        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            wirebus_core::init_observability(config.clone())
                .map_err(|e| Error::Internal(format!("Failed to initialize observability: {}", e)))?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        let strategy: Box<dyn ReconnectionStrategy> = match (self.enable_reconnect, self.reconnect_strategy) {
            (false, _) => Box::new(NoReconnect),
            (true, Some(strategy)) => strategy,
            (true, None) => Box::new(self.config.backoff()),
        };

        let registry = SubscriptionRegistry::new();
        let requests = RequestManager::new();
        let streams = StreamTable::new();
        let state = Arc::new(ConnectionManager::new(strategy, metrics.clone()));
        let router = Arc::new(Router::new(
            registry.clone(),
            requests.clone(),
            streams.clone(),
            metrics.clone(),
        ));
        let connection = Arc::new(Connection::new(
            self.endpoint,
            self.tokens,
            Arc::clone(&state),
            Arc::clone(&router),
        ));

        if let Some(ref m) = metrics {
            m.update_connection_state(state.state().as_gauge());
        }

        Ok(Client::from_inner(ClientInner {
            connection,
            state,
            router,
            registry,
            requests,
            streams,
            config: self.config,
            metrics,
        }))
    }

    /// Build, connect and wait for the first successful handshake
    ///
    /// Waits at most the configured default request timeout.
    pub async fn connect(self) -> Result<Client> {
        let client = self.build()?;
        client.connect()?;
        client
            .wait_until_connected(client.config().default_request_timeout())
            .await?;
        tracing::info!("Connected successfully");
        Ok(client)
    }
}
