use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::client::ClientHandle;
use crate::config::{ConfigError, FactoryConfig};
use crate::destination::{Destination, DestinationError};
use crate::locks::KeyedLockRegistry;
use crate::settings::ClientSettings;
use crate::transport::{Connector, ReqwestConnector, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ClientCreationReason {
    #[error(transparent)]
    Destination(#[from] DestinationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("failed to create client for `{destination}`: {source}")]
    ClientCreation {
        destination: String,
        #[source]
        source: ClientCreationReason,
    },
    #[error("client factory has been disposed")]
    Disposed,
}

impl FactoryError {
    fn creation(destination: &str, source: impl Into<ClientCreationReason>) -> Self {
        Self::ClientCreation {
            destination: destination.to_string(),
            source: source.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigureError<E> {
    #[error(transparent)]
    Factory(#[from] FactoryError),
    #[error(transparent)]
    Mutation(E),
}

impl<E> ConfigureError<E> {
    /// The mutation's own error, if that is what failed.
    pub fn into_mutation(self) -> Option<E> {
        match self {
            Self::Mutation(err) => Some(err),
            Self::Factory(_) => None,
        }
    }
}

/// Cache slot for one destination. The map only ever stores the empty cell;
/// the handle is built into it outside the map's shard lock.
type Slot<T> = Arc<OnceCell<Arc<ClientHandle<T>>>>;

enum SlotError {
    Failed(FactoryError),
    /// The slot was dropped from the map while we waited on it.
    Stale,
}

/// Hands out one cached [`ClientHandle`] per [`Destination`].
///
/// `resolve` and `configure` may be called from any number of threads. Handles
/// for different destinations never contend with each other: the map is only
/// locked long enough to find or insert an empty slot, transports are built
/// outside it, and configuration is serialized per destination only.
pub struct ClientFactory<C: Connector = ReqwestConnector> {
    connector: C,
    defaults: ClientSettings,
    clients: DashMap<Destination, Slot<C::Transport>>,
    locks: Arc<KeyedLockRegistry<Destination>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl ClientFactory<ReqwestConnector> {
    pub fn from_config(config: &FactoryConfig) -> Result<Self, ConfigError> {
        let defaults = config.default_settings()?;
        Ok(Self::with_settings(ReqwestConnector::from_config(config), defaults))
    }
}

impl Default for ClientFactory<ReqwestConnector> {
    fn default() -> Self {
        Self::new(ReqwestConnector::new())
    }
}

impl<C: Connector> ClientFactory<C> {
    pub fn new(connector: C) -> Self {
        Self::with_settings(connector, ClientSettings::default())
    }

    /// `defaults` seeds the settings of every handle this factory creates.
    pub fn with_settings(connector: C, defaults: ClientSettings) -> Self {
        Self::with_lock_registry(connector, defaults, Arc::new(KeyedLockRegistry::new()))
    }

    pub fn with_lock_registry(
        connector: C,
        defaults: ClientSettings,
        locks: Arc<KeyedLockRegistry<Destination>>,
    ) -> Self {
        Self {
            connector,
            defaults,
            clients: DashMap::new(),
            locks,
            next_id: AtomicU64::new(1),
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the cached handle for the destination of `url`, creating it on
    /// first use.
    ///
    /// Concurrent first calls for one destination build exactly one transport;
    /// the others wait for it. Calls for other destinations never wait. A
    /// failed build leaves nothing behind in the cache.
    pub fn resolve(&self, url: &str) -> Result<Arc<ClientHandle<C::Transport>>, FactoryError> {
        self.ensure_live()?;
        let destination =
            Destination::parse(url).map_err(|err| self.creation_failed(url, err))?;

        loop {
            self.ensure_live()?;
            let slot = self.slot(&destination);
            if let Some(existing) = slot.get() {
                tracing::trace!(%destination, id = existing.id(), "client cache hit");
                return Ok(Arc::clone(existing));
            }

            match slot.get_or_try_init(|| self.create(url, &destination, &slot)) {
                Ok(handle) => {
                    let handle = Arc::clone(handle);
                    if self.is_disposed() {
                        // `dispose` may have drained the map before the slot was filled.
                        handle.release();
                        return Err(FactoryError::Disposed);
                    }
                    return Ok(handle);
                }
                Err(SlotError::Stale) => continue,
                Err(SlotError::Failed(err)) => return Err(err),
            }
        }
    }

    /// Resolves the handle for `url` and runs `mutation` on its settings while
    /// holding that destination's lock.
    ///
    /// The mutation edits a copy of the current settings. The copy is published
    /// when the mutation returns, whether it succeeded or not, so other callers
    /// see either none or all of what it changed. Nothing is rolled back.
    pub fn configure<F, R, E>(&self, url: &str, mutation: F) -> Result<R, ConfigureError<E>>
    where
        F: FnOnce(&mut ClientSettings) -> Result<R, E>,
    {
        let handle = self.resolve(url)?;
        let destination = handle.destination();

        let _lock = self.locks.acquire(destination);
        tracing::trace!(%destination, id = handle.id(), "configuring client");

        let mut settings = (*handle.settings()).clone();
        let outcome = mutation(&mut settings);
        handle.publish(settings);

        outcome.map_err(ConfigureError::Mutation)
    }

    /// Cached handle for `url`, without creating one.
    pub fn get(&self, url: &str) -> Option<Arc<ClientHandle<C::Transport>>> {
        let destination = Destination::parse(url).ok()?;
        let slot = self.clients.get(&destination).map(|entry| Arc::clone(entry.value()))?;
        slot.get().cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.get(url).is_some()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        let mut destinations: Vec<_> = self
            .clients
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        destinations.sort();
        destinations
    }

    pub fn len(&self) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lock_registry(&self) -> &Arc<KeyedLockRegistry<Destination>> {
        &self.locks
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Releases every cached transport and empties the cache.
    ///
    /// Only the first call does any work. Afterwards `resolve` and `configure`
    /// fail with [`FactoryError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let destinations: Vec<_> = self
            .clients
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut released = 0usize;
        for destination in destinations {
            if let Some((_, slot)) = self.clients.remove(&destination) {
                if slot.get().is_some_and(|handle| handle.release()) {
                    released += 1;
                }
            }
        }
        tracing::debug!(released, "disposed client factory");
    }

    fn slot(&self, destination: &Destination) -> Slot<C::Transport> {
        if let Some(existing) = self.clients.get(destination) {
            return Arc::clone(existing.value());
        }
        let inserted = self
            .clients
            .entry(destination.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()));
        Arc::clone(inserted.value())
    }

    /// Builds the handle for `slot`. Runs with the slot's init lock held, so at
    /// most one call per slot is in flight.
    fn create(
        &self,
        url: &str,
        destination: &Destination,
        slot: &Slot<C::Transport>,
    ) -> Result<Arc<ClientHandle<C::Transport>>, SlotError> {
        if let Err(err) = self.ensure_live() {
            self.forget(destination, slot);
            return Err(SlotError::Failed(err));
        }
        let current = self
            .clients
            .get(destination)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot));
        if !current {
            return Err(SlotError::Stale);
        }

        let transport = match self.connector.connect(destination) {
            Ok(transport) => transport,
            Err(err) => {
                self.forget(destination, slot);
                return Err(SlotError::Failed(self.creation_failed(url, err)));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%destination, id, "created client");
        Ok(Arc::new(ClientHandle::new(
            id,
            destination.clone(),
            self.defaults.clone(),
            transport,
        )))
    }

    /// Drops an unfilled slot from the map. Only called under the slot's init
    /// lock, so nobody can be filling it concurrently.
    fn forget(&self, destination: &Destination, slot: &Slot<C::Transport>) {
        self.clients
            .remove_if(destination, |_, existing| Arc::ptr_eq(existing, slot));
    }

    fn ensure_live(&self) -> Result<(), FactoryError> {
        if self.is_disposed() {
            return Err(FactoryError::Disposed);
        }
        Ok(())
    }

    fn creation_failed(&self, url: &str, reason: impl Into<ClientCreationReason>) -> FactoryError {
        let err = FactoryError::creation(url, reason);
        tracing::warn!(destination = url, error = %err, "client creation failed");
        err
    }
}

impl<C: Connector> Drop for ClientFactory<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}
