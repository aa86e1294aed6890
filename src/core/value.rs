//! Handle to a single value read from the store.

use super::parse::{parse_bool, parse_duration};
use crate::error::{KvError, Result};
use crate::sources::KvPair;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Transform applied to the raw string before it is returned or converted.
pub type ValueMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// A value read from the store, with typed accessors.
///
/// Every accessor works on [`as_string`](Self::as_string), i.e. after the
/// optional [`ValueMapper`] has been applied. Accessors return
/// [`KvError::Conversion`] when the text does not parse; the `*_or` variants
/// fall back to a caller-supplied default instead.
///
/// # Examples
///
/// ```rust
/// use consul_kv_config::core::KvValue;
/// use consul_kv_config::sources::KvPair;
///
/// let value = KvValue::new(KvPair {
///     key: "dev/port".into(),
///     value: b"8080".to_vec(),
///     ..Default::default()
/// });
///
/// assert_eq!(value.as_i32().unwrap(), 8080);
/// assert!(value.as_bool().is_err());
/// assert!(value.bool_or(true));
/// ```
#[derive(Clone)]
pub struct KvValue {
    pair: KvPair,
    mapper: Option<ValueMapper>,
}

impl KvValue {
    /// Wrap a raw entry.
    pub fn new(pair: KvPair) -> Self {
        Self { pair, mapper: None }
    }

    /// Wrap a raw entry with a string transform.
    pub fn with_mapper(pair: KvPair, mapper: ValueMapper) -> Self {
        Self {
            pair,
            mapper: Some(mapper),
        }
    }

    /// The key this value was read from.
    pub fn key(&self) -> &str {
        &self.pair.key
    }

    /// The stored bytes, before any transform.
    pub fn raw(&self) -> &[u8] {
        &self.pair.value
    }

    /// Store index of the last write to this key.
    pub fn modify_index(&self) -> u64 {
        self.pair.modify_index
    }

    /// Opaque flags stored with the key.
    pub fn flags(&self) -> u64 {
        self.pair.flags
    }

    /// The value as text, with the mapper applied if one was given.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn as_string(&self) -> String {
        let raw = String::from_utf8_lossy(&self.pair.value);
        match &self.mapper {
            Some(mapper) => mapper(&raw),
            None => raw.into_owned(),
        }
    }

    /// Run a predicate against [`as_string`](Self::as_string).
    pub fn validate<F>(&self, predicate: F) -> bool
    where
        F: FnOnce(&str) -> bool,
    {
        predicate(&self.as_string())
    }

    fn convert<T, E, F>(&self, target: &'static str, parse: F) -> Result<T>
    where
        F: FnOnce(&str) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        parse(&self.as_string()).map_err(|e| KvError::conversion(self.key(), target, e))
    }

    /// Parse as a boolean (`1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`, ...).
    pub fn as_bool(&self) -> Result<bool> {
        self.convert("bool", parse_bool)
    }

    /// Parse as a signed 32-bit integer.
    pub fn as_i32(&self) -> Result<i32> {
        self.convert("i32", str::parse::<i32>)
    }

    /// Parse as a signed 64-bit integer.
    pub fn as_i64(&self) -> Result<i64> {
        self.convert("i64", str::parse::<i64>)
    }

    /// Parse as an unsigned 32-bit integer.
    pub fn as_u32(&self) -> Result<u32> {
        self.convert("u32", str::parse::<u32>)
    }

    /// Parse as an unsigned 64-bit integer.
    pub fn as_u64(&self) -> Result<u64> {
        self.convert("u64", str::parse::<u64>)
    }

    /// Parse as a 64-bit float.
    pub fn as_f64(&self) -> Result<f64> {
        self.convert("f64", str::parse::<f64>)
    }

    /// Parse a duration like `300ms`, `1.5s` or `1h30m`.
    pub fn as_duration(&self) -> Result<Duration> {
        self.convert("Duration", parse_duration)
    }

    /// Parse a timestamp with a `strftime`-style format.
    pub fn as_time(&self, format: &str) -> Result<NaiveDateTime> {
        self.convert("NaiveDateTime", |s| NaiveDateTime::parse_from_str(s, format))
    }

    /// Parse an RFC 3339 timestamp.
    pub fn as_rfc3339(&self) -> Result<DateTime<FixedOffset>> {
        self.convert("DateTime", DateTime::parse_from_rfc3339)
    }

    /// Decode a JSON object.
    pub fn as_json_object(&self) -> Result<Map<String, JsonValue>> {
        self.convert("JSON object", |s| serde_json::from_str::<Map<String, JsonValue>>(s))
    }

    /// Decode a JSON array.
    pub fn as_json_array(&self) -> Result<Vec<JsonValue>> {
        self.convert("JSON array", |s| serde_json::from_str::<Vec<JsonValue>>(s))
    }

    /// Decode JSON into any deserializable type.
    pub fn as_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.convert(std::any::type_name::<T>(), |s| serde_json::from_str::<T>(s))
    }

    /// The string value, or `default` when it is empty.
    pub fn string_or(&self, default: impl Into<String>) -> String {
        let value = self.as_string();
        if value.is_empty() {
            default.into()
        } else {
            value
        }
    }

    /// Like [`as_bool`](Self::as_bool), falling back to `default`.
    pub fn bool_or(&self, default: bool) -> bool {
        self.as_bool().unwrap_or(default)
    }

    /// Like [`as_i32`](Self::as_i32), falling back to `default`.
    pub fn i32_or(&self, default: i32) -> i32 {
        self.as_i32().unwrap_or(default)
    }

    /// Like [`as_i64`](Self::as_i64), falling back to `default`.
    pub fn i64_or(&self, default: i64) -> i64 {
        self.as_i64().unwrap_or(default)
    }

    /// Like [`as_u32`](Self::as_u32), falling back to `default`.
    pub fn u32_or(&self, default: u32) -> u32 {
        self.as_u32().unwrap_or(default)
    }

    /// Like [`as_u64`](Self::as_u64), falling back to `default`.
    pub fn u64_or(&self, default: u64) -> u64 {
        self.as_u64().unwrap_or(default)
    }

    /// Like [`as_f64`](Self::as_f64), falling back to `default`.
    pub fn f64_or(&self, default: f64) -> f64 {
        self.as_f64().unwrap_or(default)
    }

    /// Like [`as_duration`](Self::as_duration), falling back to `default`.
    pub fn duration_or(&self, default: Duration) -> Duration {
        self.as_duration().unwrap_or(default)
    }

    /// Like [`as_time`](Self::as_time), falling back to `default`.
    pub fn time_or(&self, format: &str, default: NaiveDateTime) -> NaiveDateTime {
        self.as_time(format).unwrap_or(default)
    }

    /// Like [`as_json_object`](Self::as_json_object), falling back to `default`.
    pub fn json_object_or(&self, default: Map<String, JsonValue>) -> Map<String, JsonValue> {
        self.as_json_object().unwrap_or(default)
    }

    /// Like [`as_json_array`](Self::as_json_array), falling back to `default`.
    pub fn json_array_or(&self, default: Vec<JsonValue>) -> Vec<JsonValue> {
        self.as_json_array().unwrap_or(default)
    }
}

impl fmt::Display for KvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl fmt::Debug for KvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvValue")
            .field("key", &self.pair.key)
            .field("value", &String::from_utf8_lossy(&self.pair.value))
            .field("modify_index", &self.pair.modify_index)
            .field("mapped", &self.mapper.is_some())
            .finish()
    }
}
