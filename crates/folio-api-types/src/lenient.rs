//! Tolerant decoders for fields the server is loose about.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Decode `null` as `T::default()`. Pair with `#[serde(default)]` to also cover a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifiers arrive as strings from some endpoints and as integers from others.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number identifier, found {other}"
        ))),
    }
}

/// Prices are decimals server-side and may be serialised as JSON strings.
pub(crate) fn optional_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => Ok(value.as_f64()),
        Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
        Some(Value::String(value)) => value
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|err| D::Error::custom(format!("invalid price `{value}`: {err}"))),
        Some(other) => Err(D::Error::custom(format!("invalid price {other}"))),
    }
}
