//! Environment-variable provider.

use async_trait::async_trait;

use super::{AsyncValueSource, ValueSink, ValueSource};
use crate::binding::{KeyBinding, Resolved};
use crate::error::{ConfigError, Error};

/// Reads named values straight from the process environment.
///
/// The environment is already in memory, so every call reads it directly —
/// there is no caching layer and no async/sync divergence. Variable names
/// are matched exactly as supplied, with no case folding.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn new() -> Self {
        Self
    }

    /// Returns the variable's value, or `None` when it is unset.
    ///
    /// An unset variable with `allow_empty == false` is a
    /// [`ConfigError::EmptyValue`].
    pub fn get(&self, name: &str, allow_empty: bool) -> Result<Option<String>, Error> {
        let value = std::env::var(name).ok();
        if value.is_none() && !allow_empty {
            return Err(ConfigError::EmptyValue(name.to_string()).into());
        }
        Ok(value)
    }

    /// Sets `value` into the process environment as `name`.
    pub fn set(&self, name: &str, value: &str) {
        std::env::set_var(name, value);
    }
}

impl ValueSource for EnvSource {
    fn get(&self, binding: &KeyBinding) -> Result<Resolved, Error> {
        let value = self.get(binding.name, binding.allow_empty)?;
        Ok(Resolved::of(binding, value))
    }
}

#[async_trait]
impl AsyncValueSource for EnvSource {
    async fn get(&self, binding: &KeyBinding) -> Result<Resolved, Error> {
        ValueSource::get(self, binding)
    }
}

impl ValueSink for EnvSource {
    fn set(&self, binding: &KeyBinding, value: &str) -> Result<(), Error> {
        EnvSource::set(self, binding.name, value);
        Ok(())
    }
}
