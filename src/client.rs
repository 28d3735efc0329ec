use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;

use crate::destination::{Destination, DestinationError};
use crate::settings::ClientSettings;
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("client for {0} has been released")]
    Released(String),
    #[error(transparent)]
    Url(#[from] DestinationError),
}

/// A cached client for one [`Destination`].
///
/// Handles are shared through `Arc`. Issuing requests takes no factory lock;
/// the settings are read from the latest published snapshot.
pub struct ClientHandle<T> {
    id: u64,
    destination: Destination,
    settings: RwLock<Arc<ClientSettings>>,
    transport: RwLock<Option<T>>,
}

impl<T: Transport> ClientHandle<T> {
    pub(crate) fn new(
        id: u64,
        destination: Destination,
        settings: ClientSettings,
        transport: T,
    ) -> Self {
        Self {
            id,
            destination,
            settings: RwLock::new(Arc::new(settings)),
            transport: RwLock::new(Some(transport)),
        }
    }

    /// Identity token, unique among the handles of one factory.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Latest published settings.
    pub fn settings(&self) -> Arc<ClientSettings> {
        Arc::clone(&self.settings.read())
    }

    pub fn is_released(&self) -> bool {
        self.transport.read().is_none()
    }

    /// Runs `f` against the transport, or returns `None` once it is released.
    pub fn with_transport<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.transport.read().as_ref().map(f)
    }

    pub(crate) fn publish(&self, settings: ClientSettings) {
        *self.settings.write() = Arc::new(settings);
    }

    /// Returns `true` if this call released the transport.
    pub(crate) fn release(&self) -> bool {
        let transport = self.transport.write().take();
        match transport {
            Some(transport) => {
                transport.release();
                tracing::debug!(id = self.id, destination = %self.destination, "released client");
                true
            }
            None => false,
        }
    }
}

impl ClientHandle<Client> {
    /// Starts a request to `url`, which may be relative to the destination
    /// (`/v1/items`) or an absolute URL on the same destination.
    ///
    /// The current default headers and timeout are applied; anything set on
    /// the returned builder afterwards overrides them.
    pub fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, RequestError> {
        let url = self.destination.join(url)?;
        let client = self
            .with_transport(Client::clone)
            .ok_or_else(|| RequestError::Released(self.destination.to_string()))?;
        let settings = self.settings();

        let mut builder = client.request(method, url).headers(settings.headers.clone());
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    pub fn get(&self, url: &str) -> Result<RequestBuilder, RequestError> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> Result<RequestBuilder, RequestError> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> Result<RequestBuilder, RequestError> {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> Result<RequestBuilder, RequestError> {
        self.request(Method::DELETE, url)
    }
}

impl<T> fmt::Debug for ClientHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("released", &self.transport.read().is_none())
            .finish()
    }
}
