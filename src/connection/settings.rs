//! Connection settings and the fluent builder that produces them.

use std::path::Path;

use serde::Serialize;

use crate::connection::client::{ConnectOptions, Endpoint};
use crate::error::{BindError, Error};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;

/// How whole-object payloads are encoded for the remote store.
///
/// Fixed once the settings are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SerializerOptions {
    pub pretty: bool,
}

impl SerializerOptions {
    pub fn encode<T: Serialize>(&self, key: &str, value: &T) -> Result<String, Error> {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.map_err(|source| {
            BindError::Encode {
                key: key.to_string(),
                source,
            }
            .into()
        })
    }
}

/// Immutable description of a remote-store endpoint and its credentials.
///
/// Produced by [`ConnectionBuilder::build`]; one settings value configures
/// exactly one connection at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    #[serde(serialize_with = "masked")]
    pub password: Option<String>,
    pub use_socket: bool,
    pub use_ssl: bool,
    pub allow_admin: bool,
    pub database_index: i64,
    #[serde(skip)]
    pub serializer: SerializerOptions,
}

impl ConnectionSettings {
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Protocol-level options for opening the underlying handle.
    ///
    /// A username is only forwarded alongside a password; a socket
    /// endpoint carries no numeric port.
    pub fn connect_options(&self) -> ConnectOptions {
        let endpoint = if self.use_socket {
            Endpoint::Socket {
                path: self.host.clone().into(),
            }
        } else {
            Endpoint::Tcp {
                host: self.host.clone(),
                port: self.port.unwrap_or(DEFAULT_PORT),
            }
        };
        let password = self
            .password
            .clone()
            .filter(|value| !value.trim().is_empty());
        let username = self
            .username
            .clone()
            .filter(|value| !value.trim().is_empty())
            .filter(|_| password.is_some());
        ConnectOptions {
            endpoint,
            username,
            password,
            use_ssl: self.use_ssl,
            allow_admin: self.allow_admin,
        }
    }
}

fn masked<S: serde::Serializer>(
    password: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match password {
        Some(_) => serializer.serialize_str("********"),
        None => serializer.serialize_none(),
    }
}

/// Fluent builder for [`ConnectionSettings`].
///
/// Every setter is independently idempotent and may be called repeatedly
/// in any order; [`build`](Self::build) separates "still configuring" from
/// "ready to connect". A malformed value (an unparseable port) is held
/// until `build` so the fluent chain never has to fail mid-flight.
#[derive(Debug, Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct ConnectionBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    use_socket: bool,
    use_ssl: bool,
    allow_admin: bool,
    database_index: i64,
    serializer: SerializerOptions,
    error: Option<Error>,
}

impl ConnectionBuilder {
    /// Sets the endpoint host.
    ///
    /// An empty or blank value falls back to `localhost`. A `host:port`
    /// value is split, port first, and both halves applied. A host that
    /// names an existing local path flips the builder into socket mode and
    /// clears the numeric port — a socket endpoint and a TCP endpoint are
    /// mutually exclusive.
    pub fn host(mut self, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim();
        self.use_socket = false;
        if value.is_empty() {
            self.host = Some(DEFAULT_HOST.to_string());
            return self;
        }
        let mut host = value.to_string();
        if let Some((name, port)) = host.rsplit_once(':') {
            let name = name.to_string();
            self = self.port_str(port);
            host = name;
        }
        if names_local_path(&host) {
            self.use_socket = true;
            self.port = None;
        }
        self.host = Some(host);
        self
    }

    /// Sets the port; `None` leaves the current value untouched.
    pub fn port(mut self, value: Option<u16>) -> Self {
        if let Some(port) = value {
            self.port = Some(port);
        }
        self
    }

    /// Parses and sets the port from a string; blank strings are ignored.
    pub fn port_str(mut self, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return self;
        }
        match value.parse::<u16>() {
            Ok(port) => self.port = Some(port),
            Err(_) => {
                self.error
                    .get_or_insert(BindError::InvalidPort(value.to_string()).into());
            }
        }
        self
    }

    pub fn username(mut self, value: impl Into<String>) -> Self {
        self.username = Some(value.into());
        self
    }

    pub fn password(mut self, value: impl Into<String>) -> Self {
        self.password = Some(value.into());
        self
    }

    pub fn database_at_index(mut self, index: i64) -> Self {
        self.database_index = index;
        self
    }

    pub fn ssl_flag(mut self, flag: bool) -> Self {
        self.use_ssl = flag;
        self
    }

    pub fn allow_admin_flag(mut self, flag: bool) -> Self {
        self.allow_admin = flag;
        self
    }

    pub fn socket_flag(mut self, flag: bool) -> Self {
        self.use_socket = flag;
        self
    }

    pub fn serializer_options(mut self, options: SerializerOptions) -> Self {
        self.serializer = options;
        self
    }

    /// Finalizes the settings, surfacing any value error recorded while
    /// configuring.
    pub fn build(self) -> Result<ConnectionSettings, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(ConnectionSettings {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: if self.use_socket {
                None
            } else {
                Some(self.port.unwrap_or(DEFAULT_PORT))
            },
            username: self.username,
            password: self.password,
            use_socket: self.use_socket,
            use_ssl: self.use_ssl,
            allow_admin: self.allow_admin,
            database_index: self.database_index,
            serializer: self.serializer,
        })
    }
}

/// A socket endpoint is any existing non-directory path.
fn names_local_path(host: &str) -> bool {
    let path = Path::new(host);
    path.exists() && !path.is_dir()
}
