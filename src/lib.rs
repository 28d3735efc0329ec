//! A per-destination cache of reusable HTTP clients.
//!
//! [`ClientFactory`] hands out one [`ClientHandle`] per scheme, host and port,
//! so every request to a host shares one connection pool. Settings of a single
//! handle can be changed through [`ClientFactory::configure`], which serializes
//! writers per destination using a [`KeyedLockRegistry`] and never blocks
//! callers working with other destinations.

pub mod client;
pub mod config;
pub mod destination;
pub mod factory;
pub mod locks;
pub mod settings;
pub mod transport;

pub use client::{ClientHandle, RequestError};
pub use config::{ConfigError, ConfigManager, FactoryConfig};
pub use destination::{Destination, DestinationError};
pub use factory::{ClientCreationReason, ClientFactory, ConfigureError, FactoryError};
pub use locks::{KeyedLockRegistry, ScopedLock};
pub use settings::{ClientSettings, SettingsError};
pub use transport::{Connector, ReqwestConnector, Transport, TransportError};
