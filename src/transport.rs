use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::FactoryConfig;
use crate::destination::Destination;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

/// A connection-owning client that the factory caches per destination.
pub trait Transport: Send + Sync + 'static {
    /// Frees the resources held by the transport. Called at most once.
    fn release(self);
}

/// Builds the transport for a destination the first time it is resolved.
///
/// Other callers resolving the same destination wait for this to return, so an
/// implementation must not resolve `destination` through the same factory.
pub trait Connector: Send + Sync {
    type Transport: Transport;

    fn connect(&self, destination: &Destination) -> Result<Self::Transport, TransportError>;
}

impl Transport for Client {
    fn release(self) {
        drop(self);
    }
}

/// Builds one blocking [`Client`] (and therefore one connection pool) per destination.
#[derive(Debug, Clone, Default)]
pub struct ReqwestConnector {
    connect_timeout: Option<Duration>,
    pool_idle_timeout: Option<Duration>,
    pool_max_idle_per_host: Option<usize>,
    user_agent: Option<String>,
}

impl ReqwestConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &FactoryConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            pool_idle_timeout: config.pool_idle_timeout(),
            pool_max_idle_per_host: config.pool_max_idle_per_host,
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

impl Connector for ReqwestConnector {
    type Transport = Client;

    fn connect(&self, destination: &Destination) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(timeout);
        }
        if let Some(max) = self.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max);
        }

        tracing::trace!(%destination, "building reqwest client");
        Ok(builder.build()?)
    }
}

const DEFAULT_USER_AGENT: &str = concat!("hostpool/", env!("CARGO_PKG_VERSION"));
