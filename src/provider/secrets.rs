//! Secrets-directory provider.
//!
//! Secrets live one per file in a directory: the file name is the secret
//! name (case-insensitive) and the file contents are the value, trimmed of
//! surrounding whitespace. The whole directory is read into a process-wide
//! map exactly once, lazily, on the first read.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use super::{AsyncValueSource, ValueSink, ValueSource};
use crate::binding::{KeyBinding, Resolved};
use crate::error::{ConfigError, Error};

#[cfg(windows)]
const DEFAULT_DIRECTORY: &str = "\\ProgramData\\Docker\\secrets";
#[cfg(not(windows))]
const DEFAULT_DIRECTORY: &str = "/run/secrets";

static SHARED: Lazy<SecretStore> = Lazy::new(SecretStore::default);

struct State {
    directory: PathBuf,
    cache: Option<HashMap<String, String>>,
}

struct Inner {
    state: Mutex<State>,
    scans: AtomicUsize,
}

/// A lazily populated store of file-backed secrets.
///
/// Cloning yields another handle to the same state. The cache is filled by
/// a single directory scan on first read, serialized under the store lock
/// so concurrent first users still produce exactly one scan. Once
/// populated it is never implicitly invalidated — changing the directory
/// afterwards does not re-trigger a read.
#[derive(Clone)]
pub struct SecretStore {
    inner: Arc<Inner>,
}

impl Default for SecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTORY)
    }
}

impl SecretStore {
    /// Creates an isolated store rooted at `directory`.
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    directory: absolute(directory.as_ref()),
                    cache: None,
                }),
                scans: AtomicUsize::new(0),
            }),
        }
    }

    /// The process-wide store, rooted at the platform default directory.
    pub fn shared() -> &'static SecretStore {
        &SHARED
    }

    /// Points the store at a different directory.
    ///
    /// The path is normalized to an absolute path. This does not read the
    /// directory, and it does not invalidate a cache that was already
    /// populated from the previous directory.
    pub fn set_directory(&self, directory: impl AsRef<Path>) {
        let mut state = self.lock();
        state.directory = absolute(directory.as_ref());
    }

    /// Returns the secret named `name`, populating the cache on first use.
    ///
    /// Names may be passed bare or path-qualified; either form resolves to
    /// the same entry. A missing or blank value yields `None` when
    /// `allow_empty` is set and [`ConfigError::EmptyValue`] otherwise.
    pub fn get(&self, name: &str, allow_empty: bool) -> Result<Option<String>, Error> {
        let mut state = self.lock();
        self.populate(&mut state)?;
        let key = normalize(&state.directory, name);
        let value = state
            .cache
            .as_ref()
            .and_then(|cache| cache.get(&key))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(String::from);
        if value.is_none() && !allow_empty {
            return Err(ConfigError::EmptyValue(name.to_string()).into());
        }
        Ok(value)
    }

    /// Asynchronous form of [`get`](Self::get); shares the same lock, so
    /// concurrent first use still scans the directory once.
    pub async fn get_async(&self, name: &str, allow_empty: bool) -> Result<Option<String>, Error> {
        let store = self.clone();
        let name = name.to_owned();
        tokio::task::spawn_blocking(move || store.get(&name, allow_empty))
            .await
            .expect("secrets read task panicked")
    }

    /// Stores `name = value` in the cache and, best-effort, on disk.
    ///
    /// The filesystem write may fail (read-only secrets mounts are common);
    /// the failure is logged and swallowed so the in-memory value is still
    /// visible to every later read in this process.
    pub fn set(&self, name: &str, value: &str) {
        let mut state = self.lock();
        let path = state.directory.join(name.to_lowercase());
        if let Err(error) = std::fs::write(&path, value) {
            tracing::warn!(path = %path.display(), %error, "secret not persisted to disk");
        }
        // Scan before inserting so a later population cannot shadow the
        // new value with stale file contents.
        if self.populate(&mut state).is_err() {
            state.cache.get_or_insert_with(HashMap::new);
        }
        let key = normalize(&state.directory, name);
        if let Some(cache) = state.cache.as_mut() {
            cache.insert(key, value.to_string());
        }
    }

    /// Asynchronous form of [`set`](Self::set).
    pub async fn set_async(&self, name: &str, value: &str) {
        let store = self.clone();
        let name = name.to_owned();
        let value = value.to_owned();
        tokio::task::spawn_blocking(move || store.set(&name, &value))
            .await
            .expect("secrets write task panicked");
    }

    /// Number of directory scans performed so far (0 or 1 in normal use).
    pub fn scan_count(&self) -> usize {
        self.inner.scans.load(Ordering::SeqCst)
    }

    /// Drops the cached map and scan counter so the next read re-scans.
    ///
    /// Test teardown path; production code never invalidates the cache.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.cache = None;
        self.inner.scans.store(0, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("secret store lock poisoned")
    }

    /// Fills the cache from the directory if it has not been filled yet.
    /// Callers hold the state lock, so the check-and-populate sequence is
    /// serialized and the scan happens at most once.
    fn populate(&self, state: &mut State) -> Result<(), Error> {
        if state.cache.is_some() {
            return Ok(());
        }
        let directory = state.directory.clone();
        tracing::debug!(directory = %directory.display(), "populating secrets cache");
        self.inner.scans.fetch_add(1, Ordering::SeqCst);

        let entries = std::fs::read_dir(&directory).map_err(|source| ConfigError::SecretScan {
            path: directory.clone(),
            source,
        })?;
        let mut cache = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::SecretScan {
                path: directory.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let contents =
                std::fs::read_to_string(&path).map_err(|source| ConfigError::SecretRead {
                    path: path.clone(),
                    source,
                })?;
            cache.insert(
                normalize(&directory, &path.to_string_lossy()),
                contents.trim().to_string(),
            );
        }
        state.cache = Some(cache);
        Ok(())
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SecretStore")
            .field("directory", &state.directory)
            .field("populated", &state.cache.is_some())
            .finish()
    }
}

impl ValueSource for SecretStore {
    fn get(&self, binding: &KeyBinding) -> Result<Resolved, Error> {
        let value = self.get(binding.name, binding.allow_empty)?;
        Ok(Resolved::of(binding, value))
    }
}

#[async_trait]
impl AsyncValueSource for SecretStore {
    async fn get(&self, binding: &KeyBinding) -> Result<Resolved, Error> {
        let value = self.get_async(binding.name, binding.allow_empty).await?;
        Ok(Resolved::of(binding, value))
    }
}

impl ValueSink for SecretStore {
    fn set(&self, binding: &KeyBinding, value: &str) -> Result<(), Error> {
        SecretStore::set(self, binding.name, value);
        Ok(())
    }
}

/// Lower-cases a secret name and strips the directory prefix and any
/// leading separator, so bare and path-qualified names are
/// interchangeable.
fn normalize(directory: &Path, name: &str) -> String {
    let prefix = directory.to_string_lossy().to_lowercase();
    let name = name.to_lowercase();
    name.strip_prefix(&prefix)
        .unwrap_or(&name)
        .trim_start_matches(['/', '\\'])
        .to_string()
}

/// Absolute form of `path`, resolved against the working directory when
/// relative. The path does not have to exist.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}
