//! Value coercion for resolved configuration strings.
//!
//! A resolved string is moved into a target type by an ordered strategy
//! list: structured decode (the string is a self-contained JSON payload)
//! first, then a scalar fallback that classifies the raw string as a
//! boolean, integer, float, or bare string.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BindError, ConfigError, Error};
use crate::binding::KeyBinding;

/// A value fetched from a provider, tagged with the requesting key name
/// and its allow-empty policy.
///
/// A blank (whitespace-only) value is treated the same as an absent one:
/// required keys reject it, optional keys fall back to the default.
#[derive(Debug, Clone)]
pub struct Resolved {
    name: String,
    allow_empty: bool,
    value: Option<String>,
}

impl Resolved {
    /// Tags a provider result with the binding that requested it.
    pub fn of(binding: &KeyBinding, value: Option<String>) -> Self {
        Self::named(binding.name, binding.allow_empty, value)
    }

    /// Tags a provider result with a runtime key name.
    pub fn named(name: impl Into<String>, allow_empty: bool, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            allow_empty,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allow_empty(&self) -> bool {
        self.allow_empty
    }

    /// Returns the value unless it is absent or blank.
    pub fn non_blank(&self) -> Option<&str> {
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .and(self.value.as_deref())
    }
}

/// Coerces a resolved value into `T`.
///
/// An absent or blank value yields `T::default()` when the key allows
/// emptiness, and [`ConfigError::EmptyValue`] otherwise — never a partial
/// value. A present value is decoded as JSON first; when that fails, the
/// raw string is classified as a scalar and decoded again. Failing both
/// strategies is a fatal [`BindError::Coerce`].
pub fn coerce<T>(resolved: &Resolved) -> Result<T, Error>
where
    T: DeserializeOwned + Default,
{
    let raw = match resolved.non_blank() {
        Some(raw) => raw,
        None if resolved.allow_empty() => return Ok(T::default()),
        None => return Err(ConfigError::EmptyValue(resolved.name().to_string()).into()),
    };

    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_value(scalar_value(raw)).map_err(|e| {
            BindError::Coerce {
                key: resolved.name().to_string(),
                source: e,
            }
            .into()
        }),
    }
}

/// Renders a field value back into the string form the providers store.
///
/// The dual of [`coerce`]: scalars render bare (no JSON quoting), so a
/// stored string survives a later scalar-fallback read; everything else
/// renders as a JSON payload.
pub fn render<T: Serialize>(key: &str, value: &T) -> Result<String, Error> {
    let encoded = serde_json::to_value(value).map_err(|e| BindError::Encode {
        key: key.to_string(),
        source: e,
    })?;
    Ok(match encoded {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Classifies a raw string as the most specific JSON scalar:
/// boolean, integer, float, or string (fallback).
fn scalar_value(s: &str) -> Value {
    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if looks_like_integer(s) {
        if let Ok(i) = s.parse::<i64>() {
            return Value::from(i);
        }
    }

    if s.contains('.') {
        if let Ok(f) = s.parse::<f64>() {
            return Value::from(f);
        }
    }

    Value::String(s.to_string())
}

fn looks_like_integer(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn optional(name: &str, value: Option<&str>) -> Resolved {
        Resolved::named(name, true, value.map(String::from))
    }

    fn required(name: &str, value: Option<&str>) -> Resolved {
        Resolved::named(name, false, value.map(String::from))
    }

    #[test]
    fn test_coerce_string_falls_back_to_scalar() {
        let value: String = coerce(&optional("host", Some("cache-01"))).unwrap();
        assert_eq!(value, "cache-01");
    }

    #[test]
    fn test_coerce_integer() {
        let value: u16 = coerce(&optional("port", Some("7000"))).unwrap();
        assert_eq!(value, 7000);
    }

    #[test]
    fn test_coerce_bool_case_insensitive() {
        let value: bool = coerce(&optional("flag", Some("True"))).unwrap();
        assert!(value);
    }

    #[test]
    fn test_coerce_nullable_numeric() {
        let value: Option<u16> = coerce(&optional("port", Some("6379"))).unwrap();
        assert_eq!(value, Some(6379));
    }

    #[test]
    fn test_coerce_absent_with_allow_empty_yields_default() {
        let value: i64 = coerce(&optional("index", None)).unwrap();
        assert_eq!(value, 0);
    }

    #[test]
    fn test_coerce_blank_with_allow_empty_yields_default() {
        let value: String = coerce(&optional("name", Some("   "))).unwrap();
        assert_eq!(value, "");
    }

    #[test]
    fn test_coerce_absent_required_is_config_error() {
        let result: Result<String, _> = coerce(&required("host", None));
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::EmptyValue(key))) if key == "host"
        ));
    }

    #[test]
    fn test_coerce_blank_required_is_config_error() {
        let result: Result<String, _> = coerce(&required("host", Some("  ")));
        assert!(matches!(result, Err(Error::Config(ConfigError::EmptyValue(_)))));
    }

    #[test]
    fn test_coerce_structured_payload() {
        #[derive(Debug, Default, PartialEq, Deserialize)]
        struct Endpoint {
            host: String,
            port: u16,
        }

        let value: Endpoint =
            coerce(&optional("endpoint", Some(r#"{"host":"db","port":7000}"#))).unwrap();
        assert_eq!(
            value,
            Endpoint {
                host: "db".into(),
                port: 7000
            }
        );
    }

    #[test]
    fn test_coerce_unparseable_is_bind_error() {
        let result: Result<u16, _> = coerce(&optional("port", Some("not-a-port")));
        assert!(matches!(result, Err(Error::Bind(BindError::Coerce { .. }))));
    }

    #[test]
    fn test_render_string_is_bare() {
        assert_eq!(render("host", &"db".to_string()).unwrap(), "db");
    }

    #[test]
    fn test_render_scalar_and_structured() {
        assert_eq!(render("port", &7000u16).unwrap(), "7000");

        #[derive(Serialize)]
        struct Pair {
            a: i32,
        }
        assert_eq!(render("pair", &Pair { a: 1 }).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_render_coerce_round_trip() {
        let rendered = render("flag", &true).unwrap();
        let back: bool = coerce(&optional("flag", Some(&rendered))).unwrap();
        assert!(back);
    }
}
