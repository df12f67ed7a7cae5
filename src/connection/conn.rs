//! The lazily connected wrapper around the remote store.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binding::{bind_fields, bind_fields_async, coerce, BindFields, KeyedValue, Resolved};
use crate::connection::client::{RemoteClient, RemoteHandle};
use crate::connection::settings::{ConnectionBuilder, ConnectionSettings};
use crate::error::Error;
use crate::provider::{AsyncValueSource, ValueSource};

struct Inner<C: RemoteClient> {
    client: C,
    settings: ConnectionSettings,
    handle: Mutex<Option<C::Handle>>,
    database_index: Mutex<i64>,
}

/// A stateful wrapper over one remote-store connection.
///
/// The underlying handle is created on the first `database` call, cached,
/// and reused for every later operation regardless of which database index
/// is selected — switching the index never reopens the connection. The
/// handle is retained for the life of the process; there is no close
/// surface.
///
/// Cloning is cheap and yields another reference to the same connection
/// state. The ambient database index is a shared mutable field: callers
/// mixing index-scoped typed calls with concurrent plain calls must treat
/// the scoped calls as mutually exclusive — this type restores the index
/// around each scoped call but does not take a lock for the caller.
pub struct Connection<C: RemoteClient> {
    inner: Arc<Inner<C>>,
}

impl<C: RemoteClient> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: RemoteClient> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("settings", &self.inner.settings)
            .field("database_index", &*self.index())
            .finish()
    }
}

impl<C: RemoteClient> Connection<C> {
    /// Wraps `client` with the given settings; no connection is opened yet.
    pub fn new(client: C, settings: ConnectionSettings) -> Self {
        let database_index = settings.database_index;
        Self {
            inner: Arc::new(Inner {
                client,
                settings,
                handle: Mutex::new(None),
                database_index: Mutex::new(database_index),
            }),
        }
    }

    /// Binds a provider-backed settings type and constructs the
    /// connection from it.
    pub fn from_source<S, V>(client: C, source: &V) -> Result<Self, Error>
    where
        S: BindFields + Into<ConnectionBuilder>,
        V: ValueSource + ?Sized,
    {
        let bound: S = bind_fields(source)?;
        Ok(Self::new(client, bound.into().build()?))
    }

    /// Asynchronous form of [`from_source`](Self::from_source).
    pub async fn from_source_async<S, V>(client: C, source: &V) -> Result<Self, Error>
    where
        S: BindFields + Into<ConnectionBuilder>,
        V: AsyncValueSource + ?Sized,
    {
        let bound: S = bind_fields_async(source).await?;
        Ok(Self::new(client, bound.into().build()?))
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// The database index subsequent operations address.
    pub fn database_index(&self) -> i64 {
        *self.index()
    }

    /// Selects `index` as the ambient database and returns a view over it,
    /// opening the underlying handle if this is the first use.
    pub fn database(&self, index: i64) -> Result<Database<C>, Error> {
        *self.index() = index;
        let handle = self.ensure_handle()?;
        Ok(Database { handle, index })
    }

    /// A view over the currently selected database.
    pub fn current_database(&self) -> Result<Database<C>, Error> {
        let index = *self.index();
        let handle = self.ensure_handle()?;
        Ok(Database { handle, index })
    }

    /// Asynchronous form of [`database`](Self::database); shares the
    /// connect lock with the sync path, so the handle is still opened
    /// exactly once.
    pub async fn database_async(&self, index: i64) -> Result<Database<C>, Error> {
        let connection = self.clone();
        tokio::task::spawn_blocking(move || connection.database(index))
            .await
            .expect("connect task panicked")
    }

    /// Fetches `key` from the current database and coerces it into `T`.
    ///
    /// An absent or blank value yields `T::default()` when `allow_empty`
    /// is set and an error otherwise.
    pub fn get<T>(&self, key: &str, allow_empty: bool) -> Result<T, Error>
    where
        T: DeserializeOwned + Default,
    {
        let raw = self.current_database()?.get_raw(key)?;
        coerce(&Resolved::named(key, allow_empty, raw))
    }

    /// Fetches a keyed type using its type-level binding.
    ///
    /// When the type declares a database index, that index is applied for
    /// the duration of this call and restored afterwards, error or not.
    pub fn get_keyed<T>(&self) -> Result<T, Error>
    where
        T: KeyedValue + DeserializeOwned + Default,
    {
        let _scope = self.scope_database(T::DATABASE);
        self.get(T::KEY.name, T::KEY.allow_empty)
    }

    /// Serializes `value` and stores it under `key` in the current
    /// database.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let payload = self.inner.settings.serializer.encode(key, value)?;
        self.current_database()?.set_raw(key, &payload)
    }

    /// Stores a keyed type under its type-level binding, with the same
    /// scoped database override as [`get_keyed`](Self::get_keyed).
    pub fn set_keyed<T>(&self, value: &T) -> Result<(), Error>
    where
        T: KeyedValue + Serialize,
    {
        let _scope = self.scope_database(T::DATABASE);
        self.set(T::KEY.name, value)
    }

    /// Asynchronous form of [`get`](Self::get).
    pub async fn get_async<T>(&self, key: &str, allow_empty: bool) -> Result<T, Error>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        let connection = self.clone();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || connection.get(&key, allow_empty))
            .await
            .expect("get task panicked")
    }

    /// Asynchronous form of [`get_keyed`](Self::get_keyed).
    pub async fn get_keyed_async<T>(&self) -> Result<T, Error>
    where
        T: KeyedValue + DeserializeOwned + Default + Send + 'static,
    {
        let _scope = self.scope_database(T::DATABASE);
        let connection = self.clone();
        tokio::task::spawn_blocking(move || connection.get(T::KEY.name, T::KEY.allow_empty))
            .await
            .expect("get task panicked")
    }

    /// Asynchronous form of [`set`](Self::set).
    pub async fn set_async<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let payload = self.inner.settings.serializer.encode(key, value)?;
        let connection = self.clone();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || connection.current_database()?.set_raw(&key, &payload))
            .await
            .expect("set task panicked")
    }

    /// Asynchronous form of [`set_keyed`](Self::set_keyed).
    pub async fn set_keyed_async<T>(&self, value: &T) -> Result<(), Error>
    where
        T: KeyedValue + Serialize,
    {
        let _scope = self.scope_database(T::DATABASE);
        let payload = self.inner.settings.serializer.encode(T::KEY.name, value)?;
        let connection = self.clone();
        tokio::task::spawn_blocking(move || {
            connection.current_database()?.set_raw(T::KEY.name, &payload)
        })
        .await
        .expect("set task panicked")
    }

    /// Opens the handle on first use. The check-and-connect sequence runs
    /// under the handle lock, so concurrent first callers produce exactly
    /// one connect.
    fn ensure_handle(&self) -> Result<C::Handle, Error> {
        let mut guard = self.inner.handle.lock().expect("handle lock poisoned");
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }
        let options = self.inner.settings.connect_options();
        tracing::debug!(endpoint = ?options.endpoint, "opening remote store connection");
        let handle = self.inner.client.connect(&options)?;
        *guard = Some(handle.clone());
        Ok(handle)
    }

    fn index(&self) -> MutexGuard<'_, i64> {
        self.inner
            .database_index
            .lock()
            .expect("database index lock poisoned")
    }

    /// Applies a type-level database override, if any, returning a guard
    /// that restores the previous index when dropped — including on the
    /// error path.
    fn scope_database(&self, index: Option<i64>) -> Option<IndexScope<'_>> {
        let index = index.filter(|idx| *idx >= 0)?;
        let mut current = self.index();
        let previous = *current;
        *current = index;
        drop(current);
        Some(IndexScope {
            slot: &self.inner.database_index,
            previous,
        })
    }
}

/// Restores the ambient database index on drop.
struct IndexScope<'a> {
    slot: &'a Mutex<i64>,
    previous: i64,
}

impl Drop for IndexScope<'_> {
    fn drop(&mut self) {
        if let Ok(mut current) = self.slot.lock() {
            *current = self.previous;
        }
    }
}

/// A raw string view over one logical database of an open connection.
pub struct Database<C: RemoteClient> {
    handle: C::Handle,
    index: i64,
}

impl<C: RemoteClient> Database<C> {
    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.handle.get(self.index, key)?)
    }

    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), Error> {
        Ok(self.handle.set(self.index, key, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::KeyBinding;
    use crate::connection::client::ConnectOptions;
    use crate::error::{ConfigError, TransportError};
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct MemoryHandle {
        data: Arc<Mutex<HashMap<(i64, String), String>>>,
        poisoned_key: Option<&'static str>,
    }

    impl RemoteHandle for MemoryHandle {
        fn get(&self, database: i64, key: &str) -> Result<Option<String>, TransportError> {
            if self.poisoned_key == Some(key) {
                return Err(TransportError::new("read failed"));
            }
            Ok(self
                .data
                .lock()
                .unwrap()
                .get(&(database, key.to_string()))
                .cloned())
        }

        fn set(&self, database: i64, key: &str, value: &str) -> Result<(), TransportError> {
            if self.poisoned_key == Some(key) {
                return Err(TransportError::new("write failed"));
            }
            self.data
                .lock()
                .unwrap()
                .insert((database, key.to_string()), value.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryClient {
        handle: MemoryHandle,
        connects: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl RemoteClient for MemoryClient {
        type Handle = MemoryHandle;

        fn connect(&self, _options: &ConnectOptions) -> Result<MemoryHandle, TransportError> {
            if self.refuse {
                return Err(TransportError::new("connection refused"));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.handle.clone())
        }
    }

    fn connection() -> (Connection<MemoryClient>, Arc<AtomicUsize>) {
        let client = MemoryClient::default();
        let connects = Arc::clone(&client.connects);
        let settings = ConnectionSettings::builder().host("db:7000").build().unwrap();
        (Connection::new(client, settings), connects)
    }

    #[test]
    fn test_handle_opened_lazily_and_reused() {
        let (conn, connects) = connection();
        assert_eq!(connects.load(Ordering::SeqCst), 0);

        conn.database(0).unwrap();
        conn.database(3).unwrap();
        conn.database(0).unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(conn.database_index(), 0);
    }

    #[test]
    fn test_concurrent_first_use_connects_once() {
        let (conn, connects) = connection();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                std::thread::spawn(move || conn.database(0).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_failure_propagates_and_is_not_cached() {
        let client = MemoryClient {
            refuse: true,
            ..MemoryClient::default()
        };
        let settings = ConnectionSettings::builder().host("db").build().unwrap();
        let conn = Connection::new(client, settings);
        assert!(matches!(conn.database(0), Err(Error::Transport(_))));
        assert!(matches!(conn.database(0), Err(Error::Transport(_))));
    }

    #[test]
    fn test_typed_get_absent_value_rules() {
        let (conn, _) = connection();
        let missing: String = conn.get("missing", true).unwrap();
        assert_eq!(missing, "");

        let result: Result<String, _> = conn.get("missing", false);
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::EmptyValue(_)))
        ));
    }

    #[test]
    fn test_typed_set_then_get() {
        let (conn, _) = connection();
        conn.set("answer", &42i64).unwrap();
        let value: i64 = conn.get("answer", false).unwrap();
        assert_eq!(value, 42);
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Job {
        name: String,
        spec: JobSpec,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct JobSpec {
        retries: u32,
        queue: String,
    }

    impl KeyedValue for Job {
        const KEY: KeyBinding = KeyBinding::required("jobs:current");
        const DATABASE: Option<i64> = Some(5);
    }

    #[test]
    fn test_keyed_round_trip_with_nested_field() {
        let (conn, _) = connection();
        let job = Job {
            name: "sweep".into(),
            spec: JobSpec {
                retries: 3,
                queue: "low".into(),
            },
        };
        conn.set_keyed(&job).unwrap();
        let back: Job = conn.get_keyed().unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_keyed_database_override_is_scoped() {
        let (conn, _) = connection();
        conn.database(1).unwrap();

        conn.set_keyed(&Job::default()).unwrap();
        assert_eq!(conn.database_index(), 1);

        // The payload must have landed in the declared database, not the
        // ambient one.
        let raw = conn.database(5).unwrap().get_raw("jobs:current").unwrap();
        assert!(raw.is_some());
        conn.database(1).unwrap();
        let _job: Job = conn.get_keyed().unwrap();
        assert_eq!(conn.database_index(), 1);
    }

    #[test]
    fn test_keyed_override_restored_on_error() {
        let client = MemoryClient {
            handle: MemoryHandle {
                poisoned_key: Some("jobs:current"),
                ..MemoryHandle::default()
            },
            ..MemoryClient::default()
        };
        let settings = ConnectionSettings::builder().host("db").build().unwrap();
        let conn = Connection::new(client, settings);
        conn.database(2).unwrap();

        let result: Result<Job, _> = conn.get_keyed();
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(conn.database_index(), 2);
    }

    #[test]
    fn test_transport_errors_propagate_unchanged() {
        let client = MemoryClient {
            handle: MemoryHandle {
                poisoned_key: Some("volatile"),
                ..MemoryHandle::default()
            },
            ..MemoryClient::default()
        };
        let settings = ConnectionSettings::builder().host("db").build().unwrap();
        let conn = Connection::new(client, settings);

        let result: Result<String, _> = conn.get("volatile", true);
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(matches!(
            conn.set("volatile", &"v"),
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_async_paths_share_the_handle() {
        let (conn, connects) = connection();
        conn.database_async(0).await.unwrap();
        conn.set_async("k", &"v").await.unwrap();
        let value: String = conn.get_async("k", false).await.unwrap();
        assert_eq!(value, "v");
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_keyed_override_is_scoped() {
        let (conn, _) = connection();
        conn.database_async(1).await.unwrap();
        conn.set_keyed_async(&Job::default()).await.unwrap();
        let _job: Job = conn.get_keyed_async().await.unwrap();
        assert_eq!(conn.database_index(), 1);
    }
}
