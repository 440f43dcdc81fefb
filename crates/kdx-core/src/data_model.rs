//! Data Model: Operation, RichValue
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::KdxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => f.write_str("query"),
            OperationKind::Mutation => f.write_str("mutation"),
        }
    }
}

/// One outbound procedure call travelling through the link chain
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Per-client sequence number
    pub id: u64,
    pub kind: OperationKind,
    /// Dotted procedure path (ex: "greeting.hello")
    pub path: String,
    pub input: RichValue,
    /// Free-form per-call context links may read
    pub context: HashMap<String, Value>,
}

impl Operation {
    pub fn new(id: u64, kind: OperationKind, path: impl Into<String>, input: RichValue) -> Self {
        Self {
            id,
            kind,
            path: path.into(),
            input,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

pub type OperationResult = Result<RichValue, KdxError>;

/// A value richer than JSON: keeps dates, big integers, maps, sets,
/// `undefined` and non-finite numbers apart from their JSON encodings.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RichValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    /// Millisecond precision, like the wire format
    Date(DateTime<Utc>),
    Array(Vec<RichValue>),
    Object(BTreeMap<String, RichValue>),
    Map(Vec<(RichValue, RichValue)>),
    Set(Vec<RichValue>),
}

impl RichValue {
    /// A date truncated to millisecond precision.
    pub fn date(dt: DateTime<Utc>) -> Self {
        RichValue::Date(dt.trunc_subsecs(3))
    }

    pub fn string(s: impl Into<String>) -> Self {
        RichValue::String(s.into())
    }

    /// Start an object value; chain with [`RichValue::field`].
    pub fn object() -> Self {
        RichValue::Object(BTreeMap::new())
    }

    /// Set a field on an object value. No-op on other variants.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<RichValue>) -> Self {
        if let RichValue::Object(map) = &mut self {
            map.insert(key.into(), value.into());
        }
        self
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RichValue::Undefined => "undefined",
            RichValue::Null => "null",
            RichValue::Bool(_) => "boolean",
            RichValue::Number(_) => "number",
            RichValue::BigInt(_) => "bigint",
            RichValue::String(_) => "string",
            RichValue::Date(_) => "Date",
            RichValue::Array(_) => "array",
            RichValue::Object(_) => "object",
            RichValue::Map(_) => "Map",
            RichValue::Set(_) => "Set",
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, RichValue::Undefined | RichValue::Null)
    }

    pub fn get(&self, key: &str) -> Option<&RichValue> {
        match self {
            RichValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RichValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_object(self) -> Result<BTreeMap<String, RichValue>, KdxError> {
        match self {
            RichValue::Object(map) => Ok(map),
            other => Err(KdxError::Transform(format!(
                "expected object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Lift plain JSON. Nothing in plain JSON is a date, map or set.
    pub fn from_plain(value: Value) -> Self {
        match value {
            Value::Null => RichValue::Null,
            Value::Bool(b) => RichValue::Bool(b),
            Value::Number(n) => RichValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RichValue::String(s),
            Value::Array(items) => RichValue::Array(items.into_iter().map(Self::from_plain).collect()),
            Value::Object(map) => RichValue::Object(
                map.into_iter().map(|(k, v)| (k, Self::from_plain(v))).collect(),
            ),
        }
    }

    /// Lower to plain JSON the way `JSON.stringify` would: dates become
    /// ISO strings, non-finite numbers become null and undefined object
    /// fields are dropped. Big integers, maps and sets have no plain form.
    pub fn to_plain(&self) -> Result<Value, KdxError> {
        Ok(match self {
            RichValue::Undefined | RichValue::Null => Value::Null,
            RichValue::Bool(b) => Value::Bool(*b),
            RichValue::Number(n) => number_to_json(*n).unwrap_or(Value::Null),
            RichValue::String(s) => Value::String(s.clone()),
            RichValue::Date(d) => Value::String(format_date(d)),
            RichValue::Array(items) => {
                Value::Array(items.iter().map(|v| v.to_plain()).collect::<Result<_, _>>()?)
            }
            RichValue::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    if !matches!(v, RichValue::Undefined) {
                        out.insert(k.clone(), v.to_plain()?);
                    }
                }
                Value::Object(out)
            }
            RichValue::BigInt(_) | RichValue::Map(_) | RichValue::Set(_) => {
                return Err(KdxError::Transform(format!(
                    "{} has no plain JSON representation",
                    self.type_name()
                )))
            }
        })
    }

    /// Mutable access by already-split path segments, through objects and
    /// arrays only.
    pub(crate) fn get_path_mut(&mut self, path: &[String]) -> Option<&mut RichValue> {
        let mut current = self;
        for segment in path {
            current = match current {
                RichValue::Object(map) => map.get_mut(segment)?,
                RichValue::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<bool> for RichValue {
    fn from(b: bool) -> Self {
        RichValue::Bool(b)
    }
}

impl From<f64> for RichValue {
    fn from(n: f64) -> Self {
        RichValue::Number(n)
    }
}

impl From<i64> for RichValue {
    fn from(n: i64) -> Self {
        RichValue::Number(n as f64)
    }
}

impl From<&str> for RichValue {
    fn from(s: &str) -> Self {
        RichValue::String(s.to_string())
    }
}

impl From<String> for RichValue {
    fn from(s: String) -> Self {
        RichValue::String(s)
    }
}

impl From<DateTime<Utc>> for RichValue {
    fn from(dt: DateTime<Utc>) -> Self {
        RichValue::date(dt)
    }
}

impl From<Vec<RichValue>> for RichValue {
    fn from(items: Vec<RichValue>) -> Self {
        RichValue::Array(items)
    }
}

/// Finite numbers as JSON; integral values print without a fraction.
pub(crate) fn number_to_json(n: f64) -> Option<Value> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Some(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Value::Number)
}

pub(crate) fn format_date(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
