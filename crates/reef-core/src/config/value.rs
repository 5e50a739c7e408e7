//! [`ConfigValue`] — typed configuration values with provenance.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Source;
use crate::error::ConfigError;

/// Delimiter used when splitting list values out of string sources.
pub const LIST_DELIMITER: char = ',';

// =============================================================================
// ConfigValue
// =============================================================================

/// A configuration value as produced by a source adapter.
///
/// Structured sources (manifest file, KV store, defaults) yield values in
/// their native variant; string sources (environment) always yield
/// [`ConfigValue::String`] and rely on coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Integer(i64),
    /// String value.
    String(String),
    /// List of strings.
    List(Vec<String>),
    /// Nested mapping (e.g. a manifest sub-table).
    Table(serde_json::Map<String, Value>),
}

impl ConfigValue {
    /// Converts a JSON value into a `ConfigValue`.
    ///
    /// Returns `None` for `null` (treated as "no value") and for shapes the
    /// config model does not admit (floats, heterogeneous arrays).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_i64().map(Self::Integer),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                strings.map(Self::List)
            }
            Value::Object(map) => Some(Self::Table(map.clone())),
        }
    }

    /// Renders this value back into JSON (used for event payloads and the
    /// KV store wire format).
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::Number((*i).into()),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            Self::Table(map) => Value::Object(map.clone()),
        }
    }

    /// The [`ExpectedType`] this value naturally satisfies.
    pub fn actual_type(&self) -> ExpectedType {
        match self {
            Self::Bool(_) => ExpectedType::Bool,
            Self::Integer(_) => ExpectedType::Integer,
            Self::String(_) => ExpectedType::String,
            Self::List(_) => ExpectedType::List,
            Self::Table(_) => ExpectedType::Table,
        }
    }
}

// =============================================================================
// ExpectedType + coercion
// =============================================================================

/// The type an option declares for its resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    /// UTF-8 string.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Boolean.
    Bool,
    /// List of strings.
    List,
    /// Nested mapping.
    Table,
}

impl fmt::Display for ExpectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Bool => "boolean",
            Self::List => "list",
            Self::Table => "table",
        };
        f.write_str(name)
    }
}

/// Coerces a raw source value to the declared type.
///
/// Integers and booleans are parsed from their canonical string forms; lists
/// are split on [`LIST_DELIMITER`] when they arrive from a string source.
/// An unparsable value is a hard [`ConfigError::TypeMismatch`] — never a
/// silent default substitution.
pub fn coerce(
    raw: ConfigValue,
    expected: ExpectedType,
    key: &str,
    source: Source,
) -> Result<ConfigValue, ConfigError> {
    if raw.actual_type() == expected {
        return Ok(raw);
    }

    let mismatch = |found: &ConfigValue| ConfigError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: format!("{found:?}"),
        origin: source,
    };

    match (&raw, expected) {
        (ConfigValue::String(s), ExpectedType::Integer) => s
            .trim()
            .parse::<i64>()
            .map(ConfigValue::Integer)
            .map_err(|_| mismatch(&raw)),
        (ConfigValue::String(s), ExpectedType::Bool) => {
            parse_bool(s).map(ConfigValue::Bool).ok_or_else(|| mismatch(&raw))
        }
        (ConfigValue::String(s), ExpectedType::List) => Ok(ConfigValue::List(
            s.split(LIST_DELIMITER)
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
        )),
        (ConfigValue::Integer(i), ExpectedType::String) => {
            Ok(ConfigValue::String(i.to_string()))
        }
        (ConfigValue::Bool(b), ExpectedType::String) => {
            Ok(ConfigValue::String(b.to_string()))
        }
        _ => Err(mismatch(&raw)),
    }
}

/// Parses the accepted boolean string forms.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// ResolvedValue + typed conversion
// =============================================================================

/// A resolved configuration value together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValue {
    /// The value in effect.
    pub value: ConfigValue,
    /// The source that produced it.
    pub source: Source,
}

/// Conversion from a coerced [`ConfigValue`] into a concrete Rust type.
///
/// Implemented for the value shapes the config model admits; used by the
/// resolver's typed accessors.
pub trait FromConfigValue: Sized {
    /// The declared type this conversion expects.
    const EXPECTED: ExpectedType;

    /// Converts the (already coerced) value. Returns `None` only when the
    /// value variant does not match `EXPECTED`, which the resolver treats as
    /// a type mismatch.
    fn from_value(value: ConfigValue) -> Option<Self>;
}

impl FromConfigValue for String {
    const EXPECTED: ExpectedType = ExpectedType::String;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromConfigValue for i64 {
    const EXPECTED: ExpectedType = ExpectedType::Integer;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Integer(i) => Some(i),
            _ => None,
        }
    }
}

impl FromConfigValue for bool {
    const EXPECTED: ExpectedType = ExpectedType::Bool;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl FromConfigValue for Vec<String> {
    const EXPECTED: ExpectedType = ExpectedType::List;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl FromConfigValue for serde_json::Map<String, Value> {
    const EXPECTED: ExpectedType = ExpectedType::Table;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Table(map) => Some(map),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_string_to_integer() {
        let v = coerce(
            ConfigValue::String("42".into()),
            ExpectedType::Integer,
            "test.key",
            Source::Environment,
        )
        .unwrap();
        assert_eq!(v, ConfigValue::Integer(42));
    }

    #[test]
    fn coerce_bool_forms() {
        for (s, expected) in [("true", true), ("1", true), ("Off", false), ("no", false)] {
            let v = coerce(
                ConfigValue::String(s.into()),
                ExpectedType::Bool,
                "test.key",
                Source::Environment,
            )
            .unwrap();
            assert_eq!(v, ConfigValue::Bool(expected));
        }
    }

    #[test]
    fn coerce_string_to_list_splits_on_comma() {
        let v = coerce(
            ConfigValue::String("a, b ,c".into()),
            ExpectedType::List,
            "test.key",
            Source::Environment,
        )
        .unwrap();
        assert_eq!(
            v,
            ConfigValue::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn unparsable_value_is_type_mismatch() {
        let err = coerce(
            ConfigValue::String("not-a-number".into()),
            ExpectedType::Integer,
            "bot.retries",
            Source::Environment,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TypeMismatch {
                origin: Source::Environment,
                ..
            }
        ));
        assert!(err.to_string().contains("environment"));
    }

    #[test]
    fn list_from_json_requires_string_items() {
        let json = serde_json::json!(["a", 1]);
        assert!(ConfigValue::from_json(&json).is_none());

        let json = serde_json::json!(["a", "b"]);
        assert_eq!(
            ConfigValue::from_json(&json),
            Some(ConfigValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn null_is_no_value() {
        assert!(ConfigValue::from_json(&Value::Null).is_none());
    }
}
