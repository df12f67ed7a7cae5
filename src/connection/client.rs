//! The seam to the remote key-value store.
//!
//! The wire protocol is not implemented here. A [`RemoteClient`] is handed
//! in from outside and treated as opaque: it knows how to turn
//! [`ConnectOptions`] into a live handle, and the handle knows how to get
//! and set string values in a numbered logical database. Transport
//! failures cross this seam untouched.

use std::path::PathBuf;

use crate::error::TransportError;

/// Where the remote store listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Socket { path: PathBuf },
}

/// Protocol-level options assembled from [`ConnectionSettings`]
/// immediately before the handle is opened.
///
/// [`ConnectionSettings`]: crate::connection::ConnectionSettings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub endpoint: Endpoint,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
    pub allow_admin: bool,
}

/// An opaque client for the remote store protocol.
pub trait RemoteClient: Send + Sync + 'static {
    type Handle: RemoteHandle;

    fn connect(&self, options: &ConnectOptions) -> Result<Self::Handle, TransportError>;
}

/// A live handle to the remote store.
///
/// Cloning is expected to be cheap and to share the underlying
/// connection; the handle stays open for the life of the process.
pub trait RemoteHandle: Clone + Send + Sync + 'static {
    fn get(&self, database: i64, key: &str) -> Result<Option<String>, TransportError>;

    fn set(&self, database: i64, key: &str, value: &str) -> Result<(), TransportError>;
}
