//! Key bindings and the object-population engine.
//!
//! Settings types declare, per field or per type, the external key name
//! each value lives under and whether an absent value is acceptable. The
//! binder walks those declarations, resolves each key through a pluggable
//! value source, and coerces the result into the declared field type. The
//! binding tables are plain compile-time data; there is no runtime type
//! introspection.

mod coerce;

pub use coerce::{coerce, render, Resolved};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ConfigError, Error};
use crate::provider::{AsyncValueSource, ValueSink, ValueSource};

/// A declared association between a value and an external lookup name,
/// plus the empty-value policy for that lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    /// The external key name (environment variable, secret file name, or
    /// remote store key).
    pub name: &'static str,
    /// Whether an absent or blank value is acceptable. When `false`, an
    /// absent value fails the bind instead of producing a default.
    pub allow_empty: bool,
}

impl KeyBinding {
    /// A binding whose value may be absent; the target falls back to its
    /// default value.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            allow_empty: true,
        }
    }

    /// A binding whose value must be present and non-blank.
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            allow_empty: false,
        }
    }
}

/// One entry in a type's field-binding table: the external key plus the
/// functions that move a resolved value into, and back out of, the field.
pub struct FieldBinding<T: ?Sized> {
    key: KeyBinding,
    assign: fn(&mut T, Resolved) -> Result<(), Error>,
    render: fn(&T) -> Result<String, Error>,
}

impl<T> FieldBinding<T> {
    pub const fn new(
        key: KeyBinding,
        assign: fn(&mut T, Resolved) -> Result<(), Error>,
        render: fn(&T) -> Result<String, Error>,
    ) -> Self {
        Self {
            key,
            assign,
            render,
        }
    }

    pub fn key(&self) -> &KeyBinding {
        &self.key
    }
}

impl<T> std::fmt::Debug for FieldBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldBinding").field("key", &self.key).finish()
    }
}

/// A type whose fields each bind to their own external key.
///
/// The table is declared once per type, in field order. An empty table is
/// a binding-configuration error, caught before any provider call.
///
/// ## Example
///
/// ```
/// use wharf_config::binding::{coerce, render, BindFields, FieldBinding, KeyBinding};
///
/// #[derive(Debug, Default)]
/// struct Settings {
///     host: String,
///     port: Option<u16>,
/// }
///
/// impl BindFields for Settings {
///     const FIELDS: &'static [FieldBinding<Self>] = &[
///         FieldBinding::new(
///             KeyBinding::required("APP_HOST"),
///             |s, v| Ok(s.host = coerce(&v)?),
///             |s| render("APP_HOST", &s.host),
///         ),
///         FieldBinding::new(
///             KeyBinding::new("APP_PORT"),
///             |s, v| Ok(s.port = coerce(&v)?),
///             |s| render("APP_PORT", &s.port),
///         ),
///     ];
/// }
/// ```
pub trait BindFields: Default + 'static {
    const FIELDS: &'static [FieldBinding<Self>];
}

/// A type bound to a single external composite key holding its entire
/// serialized payload, with an optional one-shot database-index override
/// applied while the type is being read from or written to the remote
/// store.
pub trait KeyedValue {
    const KEY: KeyBinding;
    const DATABASE: Option<i64> = None;
}

/// Populates a `T` by resolving every field binding through `source`.
///
/// Fields are resolved in declaration order; the first failure aborts the
/// bind, so no partially populated value escapes.
pub fn bind_fields<T, S>(source: &S) -> Result<T, Error>
where
    T: BindFields,
    S: ValueSource + ?Sized,
{
    check_declared::<T>()?;
    let mut target = T::default();
    for field in T::FIELDS {
        let resolved = source.get(field.key())?;
        (field.assign)(&mut target, resolved)?;
    }
    Ok(target)
}

/// Asynchronous form of [`bind_fields`] with the same contract.
pub async fn bind_fields_async<T, S>(source: &S) -> Result<T, Error>
where
    T: BindFields,
    S: AsyncValueSource + ?Sized,
{
    check_declared::<T>()?;
    let mut target = T::default();
    for field in T::FIELDS {
        let resolved = source.get(field.key()).await?;
        (field.assign)(&mut target, resolved)?;
    }
    Ok(target)
}

/// Resolves a type-level key and decodes the single payload directly
/// as `T`.
pub fn bind_keyed<T, S>(source: &S) -> Result<T, Error>
where
    T: KeyedValue + DeserializeOwned + Default,
    S: ValueSource + ?Sized,
{
    coerce(&source.get(&T::KEY)?)
}

/// Asynchronous form of [`bind_keyed`].
pub async fn bind_keyed_async<T, S>(source: &S) -> Result<T, Error>
where
    T: KeyedValue + DeserializeOwned + Default,
    S: AsyncValueSource + ?Sized,
{
    coerce(&source.get(&T::KEY).await?)
}

/// Writes every bound field of `value` back through `sink`, one external
/// key per field.
pub fn store_fields<T, S>(value: &T, sink: &S) -> Result<(), Error>
where
    T: BindFields,
    S: ValueSink + ?Sized,
{
    check_declared::<T>()?;
    for field in T::FIELDS {
        let rendered = (field.render)(value)?;
        sink.set(field.key(), &rendered)?;
    }
    Ok(())
}

/// Writes a keyed type's entire payload under its type-level key.
pub fn store_keyed<T, S>(value: &T, sink: &S) -> Result<(), Error>
where
    T: KeyedValue + Serialize,
    S: ValueSink + ?Sized,
{
    let rendered = render(T::KEY.name, value)?;
    sink.set(&T::KEY, &rendered)
}

/// Fails fast when a type carries no field bindings at all — this is a
/// declaration mistake, not a missing value, and no provider is consulted.
fn check_declared<T: BindFields>() -> Result<(), ConfigError> {
    if T::FIELDS.is_empty() {
        return Err(ConfigError::MissingBinding(std::any::type_name::<T>()));
    }
    Ok(())
}
