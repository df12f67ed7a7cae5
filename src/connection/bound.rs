//! Provider-backed connection settings.
//!
//! These are the stock settings shapes: one bound to environment
//! variables, one bound to secrets-directory entries. Both carry the same
//! fields and feed [`ConnectionBuilder`] the same way; only the external
//! key names differ.

use crate::binding::{coerce, render, BindFields, FieldBinding, KeyBinding};
use crate::connection::settings::ConnectionBuilder;

/// Connection settings resolved from environment variables
/// (`WHARF_CACHE_*`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConnectionSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_socket: bool,
    pub use_ssl: bool,
    pub allow_admin: bool,
    pub database_index: i64,
}

impl BindFields for EnvConnectionSettings {
    const FIELDS: &'static [FieldBinding<Self>] = &[
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_HOST"),
            |s, v| Ok(s.host = coerce(&v)?),
            |s| render("WHARF_CACHE_HOST", &s.host),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_PORT"),
            |s, v| Ok(s.port = coerce(&v)?),
            |s| render("WHARF_CACHE_PORT", &s.port),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_USERNAME"),
            |s, v| Ok(s.username = coerce(&v)?),
            |s| render("WHARF_CACHE_USERNAME", &s.username),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_PASSWORD"),
            |s, v| Ok(s.password = coerce(&v)?),
            |s| render("WHARF_CACHE_PASSWORD", &s.password),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_IS_SOCKET"),
            |s, v| Ok(s.use_socket = coerce(&v)?),
            |s| render("WHARF_CACHE_IS_SOCKET", &s.use_socket),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_USE_SSL"),
            |s, v| Ok(s.use_ssl = coerce(&v)?),
            |s| render("WHARF_CACHE_USE_SSL", &s.use_ssl),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_ALLOW_ADMIN"),
            |s, v| Ok(s.allow_admin = coerce(&v)?),
            |s| render("WHARF_CACHE_ALLOW_ADMIN", &s.allow_admin),
        ),
        FieldBinding::new(
            KeyBinding::new("WHARF_CACHE_DATABASE"),
            |s, v| Ok(s.database_index = coerce(&v)?),
            |s| render("WHARF_CACHE_DATABASE", &s.database_index),
        ),
    ];
}

impl From<EnvConnectionSettings> for ConnectionBuilder {
    fn from(bound: EnvConnectionSettings) -> Self {
        apply(
            ConnectionBuilder::default(),
            bound.host,
            bound.port,
            bound.username,
            bound.password,
            bound.use_socket,
            bound.use_ssl,
            bound.allow_admin,
            bound.database_index,
        )
    }
}

/// Connection settings resolved from the secrets directory
/// (`wharf-cache-*` files).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecretConnectionSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_socket: bool,
    pub use_ssl: bool,
    pub allow_admin: bool,
    pub database_index: i64,
}

impl BindFields for SecretConnectionSettings {
    const FIELDS: &'static [FieldBinding<Self>] = &[
        FieldBinding::new(
            KeyBinding::new("wharf-cache-host"),
            |s, v| Ok(s.host = coerce(&v)?),
            |s| render("wharf-cache-host", &s.host),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-port"),
            |s, v| Ok(s.port = coerce(&v)?),
            |s| render("wharf-cache-port", &s.port),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-username"),
            |s, v| Ok(s.username = coerce(&v)?),
            |s| render("wharf-cache-username", &s.username),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-password"),
            |s, v| Ok(s.password = coerce(&v)?),
            |s| render("wharf-cache-password", &s.password),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-is-socket"),
            |s, v| Ok(s.use_socket = coerce(&v)?),
            |s| render("wharf-cache-is-socket", &s.use_socket),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-use-ssl"),
            |s, v| Ok(s.use_ssl = coerce(&v)?),
            |s| render("wharf-cache-use-ssl", &s.use_ssl),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-allow-admin"),
            |s, v| Ok(s.allow_admin = coerce(&v)?),
            |s| render("wharf-cache-allow-admin", &s.allow_admin),
        ),
        FieldBinding::new(
            KeyBinding::new("wharf-cache-database"),
            |s, v| Ok(s.database_index = coerce(&v)?),
            |s| render("wharf-cache-database", &s.database_index),
        ),
    ];
}

impl From<SecretConnectionSettings> for ConnectionBuilder {
    fn from(bound: SecretConnectionSettings) -> Self {
        apply(
            ConnectionBuilder::default(),
            bound.host,
            bound.port,
            bound.username,
            bound.password,
            bound.use_socket,
            bound.use_ssl,
            bound.allow_admin,
            bound.database_index,
        )
    }
}

/// Feeds a bound settings shape through the fluent builder. The socket
/// flag is applied after host parsing so an explicit declaration wins
/// over the path heuristic.
#[allow(clippy::too_many_arguments)]
fn apply(
    builder: ConnectionBuilder,
    host: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    use_socket: bool,
    use_ssl: bool,
    allow_admin: bool,
    database_index: i64,
) -> ConnectionBuilder {
    let mut builder = builder
        .allow_admin_flag(allow_admin)
        .database_at_index(database_index)
        .host(host)
        .port(port)
        .ssl_flag(use_ssl);
    if let Some(username) = username {
        builder = builder.username(username);
    }
    if let Some(password) = password {
        builder = builder.password(password);
    }
    if use_socket {
        builder = builder.socket_flag(true);
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind_fields;
    use crate::provider::SecretStore;
    use tempfile::TempDir;

    #[test]
    fn test_secret_settings_bind_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("wharf-cache-host"), "cache-01:7000\n").unwrap();
        std::fs::write(dir.path().join("wharf-cache-password"), "hunter2").unwrap();
        std::fs::write(dir.path().join("wharf-cache-use-ssl"), "true").unwrap();
        std::fs::write(dir.path().join("wharf-cache-database"), "3").unwrap();
        let store = SecretStore::new(dir.path());

        let bound: SecretConnectionSettings = bind_fields(&store).unwrap();
        assert_eq!(bound.host, "cache-01:7000");
        assert_eq!(bound.password.as_deref(), Some("hunter2"));
        assert!(bound.use_ssl);
        assert_eq!(bound.database_index, 3);

        let settings = ConnectionBuilder::from(bound).build().unwrap();
        assert_eq!(settings.host, "cache-01");
        assert_eq!(settings.port, Some(7000));
        assert_eq!(settings.database_index, 3);
    }

    #[test]
    fn test_env_settings_bind_from_environment() {
        std::env::set_var("WHARF_CACHE_HOST", "env-cache");
        std::env::set_var("WHARF_CACHE_PORT", "6380");
        std::env::set_var("WHARF_CACHE_ALLOW_ADMIN", "true");

        let bound: EnvConnectionSettings = bind_fields(&crate::provider::EnvSource::new()).unwrap();
        assert_eq!(bound.host, "env-cache");
        assert_eq!(bound.port, Some(6380));
        assert!(bound.allow_admin);

        let settings = ConnectionBuilder::from(bound).build().unwrap();
        assert_eq!(settings.host, "env-cache");
        assert_eq!(settings.port, Some(6380));
        assert!(settings.allow_admin);
    }

    #[test]
    fn test_missing_optional_values_default() {
        let dir = TempDir::new().unwrap();
        let store = SecretStore::new(dir.path());
        let bound: SecretConnectionSettings = bind_fields(&store).unwrap();
        assert_eq!(bound, SecretConnectionSettings::default());

        let settings = ConnectionBuilder::from(bound).build().unwrap();
        assert_eq!(settings.host, "localhost");
    }
}
