//! Typed configuration resolution for services backed by a remote
//! key-value store.
//!
//! Settings types declare which external key each value lives under;
//! the binder populates them from environment variables, a secrets
//! directory, or the remote store itself, and a lazily connected
//! [`Connection`] consumes the result.

pub mod binding;
pub mod connection;
pub mod provider;
pub mod registry;

mod error;

pub use binding::{BindFields, FieldBinding, KeyBinding, KeyedValue};
pub use connection::{Connection, ConnectionBuilder, ConnectionSettings, RemoteClient};
pub use error::{BindError, ConfigError, Error, TransportError};
pub use provider::{EnvSource, SecretStore};
pub use registry::Registry;
