//! Sources of named string values.
//!
//! A provider hands the binder one string (or nothing) per requested key.
//! Two providers live here — process environment variables and a
//! secrets-directory store — and the remote connection reuses the same
//! seam for its own typed reads.

mod env;
mod secrets;

pub use env::EnvSource;
pub use secrets::SecretStore;

use async_trait::async_trait;

use crate::binding::{KeyBinding, Resolved};
use crate::error::Error;

/// A source of named string values consumed by the binder.
pub trait ValueSource: Send + Sync {
    fn get(&self, binding: &KeyBinding) -> Result<Resolved, Error>;
}

/// Asynchronous counterpart of [`ValueSource`] with the same contract.
#[async_trait]
pub trait AsyncValueSource: Send + Sync {
    async fn get(&self, binding: &KeyBinding) -> Result<Resolved, Error>;
}

/// The write-direction dual of [`ValueSource`].
pub trait ValueSink: Send + Sync {
    fn set(&self, binding: &KeyBinding, value: &str) -> Result<(), Error>;
}
