//! Remote-store connection management.
//!
//! A [`Connection`] is configured from bound settings, parked in the
//! process-wide registry, and opens its underlying handle on first use.

mod bound;
mod client;
mod conn;
mod settings;

pub use bound::{EnvConnectionSettings, SecretConnectionSettings};
pub use client::{ConnectOptions, Endpoint, RemoteClient, RemoteHandle};
pub use conn::{Connection, Database};
pub use settings::{ConnectionBuilder, ConnectionSettings, SerializerOptions};

use std::sync::Arc;

use crate::error::Error;
use crate::provider::{EnvSource, SecretStore};
use crate::registry::Registry;

/// Parks `connection` in the shared registry and returns the live
/// instance for its type — the parked one if a connection of this type
/// was parked earlier.
pub fn connect<C: RemoteClient>(connection: Connection<C>) -> Arc<Connection<C>> {
    Registry::shared().instance_or(connection)
}

/// Binds [`EnvConnectionSettings`] from the process environment and parks
/// the resulting connection in the shared registry.
pub fn connect_from_env<C: RemoteClient>(client: C) -> Result<Arc<Connection<C>>, Error> {
    let connection =
        Connection::from_source::<EnvConnectionSettings, _>(client, &EnvSource::new())?;
    Ok(connect(connection))
}

/// Binds [`SecretConnectionSettings`] from the shared secrets store and
/// parks the resulting connection in the shared registry.
pub fn connect_from_secrets<C: RemoteClient>(client: C) -> Result<Arc<Connection<C>>, Error> {
    let connection =
        Connection::from_source::<SecretConnectionSettings, _>(client, SecretStore::shared())?;
    Ok(connect(connection))
}

/// Returns the previously parked connection for this client type.
pub fn connection<C: RemoteClient>() -> Result<Arc<Connection<C>>, Error> {
    Registry::shared().instance::<Connection<C>>()
}
