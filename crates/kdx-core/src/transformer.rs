//! Transformers: how a RichValue travels as JSON
//!
//! [`SuperJson`] writes `{"json": <plain>, "meta": {"values": <tree>}}`
//! where the tree records which nodes of the plain value must be turned
//! back into dates, maps, sets, big integers, `undefined` or non-finite
//! numbers. A tree is either a leaf `[type]`, an inner node
//! `[type, {path: tree}]`, or (for nodes without a type of their own) a
//! bare `{path: tree}` record. Paths are dot-joined with `\.` and `\\`
//! escapes. On decode, children are restored before their parent.
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::data_model::{format_date, number_to_json, RichValue};
use crate::error::KdxError;

pub trait DataTransformer: Send + Sync {
    fn id(&self) -> &'static str;

    fn serialize(&self, value: &RichValue) -> Result<Value, KdxError>;

    fn deserialize(&self, value: Value) -> Result<RichValue, KdxError>;
}

/// Plain JSON in both directions. Rich-only types are rejected on the way
/// out and never produced on the way in.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainJson;

impl DataTransformer for PlainJson {
    fn id(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, value: &RichValue) -> Result<Value, KdxError> {
        value.to_plain()
    }

    fn deserialize(&self, value: Value) -> Result<RichValue, KdxError> {
        Ok(RichValue::from_plain(value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SuperJson;

const T_UNDEFINED: &str = "undefined";
const T_BIGINT: &str = "bigint";
const T_DATE: &str = "Date";
const T_NUMBER: &str = "number";
const T_MAP: &str = "map";
const T_SET: &str = "set";

impl DataTransformer for SuperJson {
    fn id(&self) -> &'static str {
        "superjson"
    }

    fn serialize(&self, value: &RichValue) -> Result<Value, KdxError> {
        let (plain, annotations) = walk(value);
        let mut envelope = Map::new();
        envelope.insert("json".to_string(), plain);
        if let Some(values) = annotations {
            envelope.insert("meta".to_string(), json!({ "values": values }));
        }
        Ok(Value::Object(envelope))
    }

    fn deserialize(&self, value: Value) -> Result<RichValue, KdxError> {
        let mut envelope = match value {
            Value::Object(map) => map,
            other => {
                return Err(KdxError::Transform(format!(
                    "superjson envelope must be an object, got {}",
                    other
                )))
            }
        };
        // `{"json": undefined}` loses its only key once stringified.
        let mut root = match envelope.remove("json") {
            Some(plain) => RichValue::from_plain(plain),
            None => RichValue::Undefined,
        };
        if let Some(values) = envelope
            .remove("meta")
            .and_then(|mut meta| meta.get_mut("values").map(Value::take))
        {
            let mut origin = Vec::new();
            apply_tree(&values, &mut root, &mut origin)?;
        }
        Ok(root)
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

fn walk(value: &RichValue) -> (Value, Option<Value>) {
    match value {
        RichValue::Undefined => (Value::Null, Some(json!([T_UNDEFINED]))),
        RichValue::Null => (Value::Null, None),
        RichValue::Bool(b) => (Value::Bool(*b), None),
        RichValue::Number(n) => match number_to_json(*n) {
            Some(_) if *n == 0.0 && n.is_sign_negative() => {
                (Value::String("-0".to_string()), Some(json!([T_NUMBER])))
            }
            Some(plain) => (plain, None),
            None => {
                let text = if n.is_nan() {
                    "NaN"
                } else if n.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                (Value::String(text.to_string()), Some(json!([T_NUMBER])))
            }
        },
        RichValue::BigInt(i) => (Value::String(i.to_string()), Some(json!([T_BIGINT]))),
        RichValue::String(s) => (Value::String(s.clone()), None),
        RichValue::Date(d) => (Value::String(format_date(d)), Some(json!([T_DATE]))),
        RichValue::Array(items) => {
            let (plain, inner) = walk_seq(items.iter());
            (Value::Array(plain), finish(None, inner))
        }
        RichValue::Set(items) => {
            let (plain, inner) = walk_seq(items.iter());
            (Value::Array(plain), finish(Some(T_SET), inner))
        }
        RichValue::Map(entries) => {
            let mut plain = Vec::with_capacity(entries.len());
            let mut inner = Map::new();
            for (index, (k, v)) in entries.iter().enumerate() {
                let (pair, pair_inner) = walk_seq([k, v].into_iter());
                plain.push(Value::Array(pair));
                merge_child(&mut inner, &index.to_string(), finish(None, pair_inner));
            }
            (Value::Array(plain), finish(Some(T_MAP), inner))
        }
        RichValue::Object(fields) => {
            let mut plain = Map::new();
            let mut inner = Map::new();
            for (key, field) in fields {
                let (child, annotations) = walk(field);
                plain.insert(key.clone(), child);
                merge_child(&mut inner, key, annotations);
            }
            (Value::Object(plain), finish(None, inner))
        }
    }
}

fn walk_seq<'a>(items: impl Iterator<Item = &'a RichValue>) -> (Vec<Value>, Map<String, Value>) {
    let mut plain = Vec::new();
    let mut inner = Map::new();
    for (index, item) in items.enumerate() {
        let (child, annotations) = walk(item);
        plain.push(child);
        merge_child(&mut inner, &index.to_string(), annotations);
    }
    (plain, inner)
}

/// Fold a child's annotations into its parent's record under `key`.
fn merge_child(inner: &mut Map<String, Value>, key: &str, annotations: Option<Value>) {
    match annotations {
        Some(tree @ Value::Array(_)) => {
            inner.insert(escape_key(key), tree);
        }
        Some(Value::Object(record)) => {
            let prefix = escape_key(key);
            for (path, tree) in record {
                inner.insert(format!("{}.{}", prefix, path), tree);
            }
        }
        _ => {}
    }
}

fn finish(own: Option<&str>, inner: Map<String, Value>) -> Option<Value> {
    match (own, inner.is_empty()) {
        (Some(ty), true) => Some(json!([ty])),
        (Some(ty), false) => Some(json!([ty, inner])),
        (None, true) => None,
        (None, false) => Some(Value::Object(inner)),
    }
}

pub(crate) fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\").replace('.', "\\.")
}

pub(crate) fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

fn apply_tree(tree: &Value, root: &mut RichValue, origin: &mut Vec<String>) -> Result<(), KdxError> {
    match tree {
        Value::Object(record) => apply_record(record, root, origin),
        Value::Array(node) => {
            let ty = node.first().and_then(Value::as_str).ok_or_else(|| {
                KdxError::Transform(format!("unsupported annotation {}", tree))
            })?;
            if let Some(Value::Object(children)) = node.get(1) {
                apply_record(children, root, origin)?;
            }
            apply_type(root, origin, ty)
        }
        other => Err(KdxError::Transform(format!("malformed annotation tree {}", other))),
    }
}

fn apply_record(
    record: &Map<String, Value>,
    root: &mut RichValue,
    origin: &mut Vec<String>,
) -> Result<(), KdxError> {
    for (key, subtree) in record {
        let depth = origin.len();
        origin.extend(parse_path(key));
        let result = apply_tree(subtree, root, origin);
        origin.truncate(depth);
        result?;
    }
    Ok(())
}

fn apply_type(root: &mut RichValue, path: &[String], ty: &str) -> Result<(), KdxError> {
    let target = root.get_path_mut(path).ok_or_else(|| {
        KdxError::Transform(format!("annotation path {} not found", path.join(".")))
    })?;
    let plain = std::mem::take(target);
    *target = untransform(plain, ty)?;
    Ok(())
}

fn untransform(value: RichValue, ty: &str) -> Result<RichValue, KdxError> {
    match (ty, value) {
        (T_UNDEFINED, _) => Ok(RichValue::Undefined),
        (T_BIGINT, RichValue::String(s)) => s
            .parse::<i128>()
            .map(RichValue::BigInt)
            .map_err(|e| KdxError::Transform(format!("invalid bigint {:?}: {}", s, e))),
        (T_DATE, RichValue::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|d| RichValue::date(d.with_timezone(&Utc)))
            .map_err(|e| KdxError::Transform(format!("invalid date {:?}: {}", s, e))),
        (T_NUMBER, RichValue::String(s)) => match s.as_str() {
            "NaN" => Ok(RichValue::Number(f64::NAN)),
            "Infinity" => Ok(RichValue::Number(f64::INFINITY)),
            "-Infinity" => Ok(RichValue::Number(f64::NEG_INFINITY)),
            "-0" => Ok(RichValue::Number(-0.0)),
            other => Err(KdxError::Transform(format!("invalid special number {:?}", other))),
        },
        (T_SET, RichValue::Array(items)) => Ok(RichValue::Set(items)),
        (T_MAP, RichValue::Array(entries)) => entries
            .into_iter()
            .map(|entry| match entry {
                RichValue::Array(pair) if pair.len() == 2 => {
                    let mut pair = pair.into_iter();
                    match (pair.next(), pair.next()) {
                        (Some(k), Some(v)) => Ok((k, v)),
                        _ => Err(KdxError::Transform("map entry must be a pair".to_string())),
                    }
                }
                other => Err(KdxError::Transform(format!(
                    "map entry must be a pair, got {}",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(RichValue::Map),
        (ty, value) => Err(KdxError::Transform(format!(
            "cannot restore {} from {}",
            ty,
            value.type_name()
        ))),
    }
}

/// Object helper for hand-written `FromRich` impls: missing fields read
/// as `undefined`.
pub fn take_field(fields: &mut BTreeMap<String, RichValue>, name: &str) -> RichValue {
    fields.remove(name).unwrap_or(RichValue::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 1, 12, 30, 0).unwrap()
    }

    fn round_trip(value: &RichValue) -> RichValue {
        let wire = SuperJson.serialize(value).unwrap();
        let text = serde_json::to_string(&wire).unwrap();
        SuperJson.deserialize(serde_json::from_str(&text).unwrap()).unwrap()
    }

    #[test]
    fn test_date_round_trip_keeps_type() {
        let value = RichValue::object()
            .field("title", "launch")
            .field("at", sample_date());
        let back = round_trip(&value);
        assert_eq!(back, value);
        assert!(matches!(back.get("at"), Some(RichValue::Date(_))));
    }

    #[test]
    fn test_date_wire_format() {
        let wire = SuperJson.serialize(&RichValue::object().field("at", sample_date())).unwrap();
        assert_eq!(
            wire,
            json!({
                "json": {"at": "2023-10-01T12:30:00.000Z"},
                "meta": {"values": {"at": ["Date"]}}
            })
        );
    }

    #[test]
    fn test_plain_values_have_no_meta() {
        let wire = SuperJson.serialize(&RichValue::from_plain(json!({"a": [1, 2]}))).unwrap();
        assert_eq!(wire, json!({"json": {"a": [1, 2]}}));
    }

    #[test]
    fn test_root_annotation() {
        let wire = SuperJson.serialize(&RichValue::date(sample_date())).unwrap();
        assert_eq!(wire["meta"]["values"], json!(["Date"]));
        assert_eq!(round_trip(&RichValue::date(sample_date())), RichValue::date(sample_date()));
    }

    #[test]
    fn test_map_with_nested_date() {
        let value = RichValue::object().field(
            "events",
            RichValue::Map(vec![(RichValue::string("start"), RichValue::date(sample_date()))]),
        );
        let wire = SuperJson.serialize(&value).unwrap();
        assert_eq!(wire["json"]["events"], json!([["start", "2023-10-01T12:30:00.000Z"]]));
        assert_eq!(wire["meta"]["values"]["events"], json!(["map", {"0.1": ["Date"]}]));
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_set_bigint_undefined_and_specials() {
        let value = RichValue::Array(vec![
            RichValue::Set(vec![RichValue::Number(1.0), RichValue::BigInt(-12345678901234567890)]),
            RichValue::Undefined,
            RichValue::Number(f64::INFINITY),
            RichValue::Number(f64::NEG_INFINITY),
        ]);
        assert_eq!(round_trip(&value), value);

        match round_trip(&RichValue::Number(f64::NAN)) {
            RichValue::Number(n) => assert!(n.is_nan()),
            other => panic!("expected NaN, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_zero_keeps_its_sign() {
        let wire = SuperJson.serialize(&RichValue::Number(-0.0)).unwrap();
        assert_eq!(wire, json!({"json": "-0", "meta": {"values": ["number"]}}));
        assert_eq!(SuperJson.serialize(&RichValue::Number(0.0)).unwrap(), json!({"json": 0}));

        let value = RichValue::object().field("delta", -0.0);
        match round_trip(&value).get("delta") {
            Some(RichValue::Number(n)) => assert!(*n == 0.0 && n.is_sign_negative()),
            other => panic!("expected -0, got {:?}", other),
        }
    }

    #[test]
    fn test_dotted_keys_are_escaped() {
        let value = RichValue::object().field("a.b", RichValue::object().field("c\\d", sample_date()));
        let wire = SuperJson.serialize(&value).unwrap();
        assert_eq!(wire["meta"]["values"], json!({"a\\.b.c\\\\d": ["Date"]}));
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("a.b"), vec!["a", "b"]);
        assert_eq!(parse_path("a\\.b.c"), vec!["a.b", "c"]);
        assert_eq!(parse_path("x\\\\.y"), vec!["x\\", "y"]);
    }

    #[test]
    fn test_missing_json_key_is_undefined() {
        assert_eq!(SuperJson.deserialize(json!({})).unwrap(), RichValue::Undefined);
    }

    #[test]
    fn test_decode_errors() {
        assert!(SuperJson.deserialize(json!([1])).is_err());
        let bad_path = json!({"json": {}, "meta": {"values": {"missing": ["Date"]}}});
        assert!(SuperJson.deserialize(bad_path).is_err());
        let bad_date = json!({"json": "yesterday", "meta": {"values": ["Date"]}});
        assert!(SuperJson.deserialize(bad_date).is_err());
        let custom = json!({"json": "x", "meta": {"values": [["class", "Foo"]]}});
        assert!(SuperJson.deserialize(custom).is_err());
    }

    #[test]
    fn test_plain_json_transformer() {
        let value = RichValue::object().field("at", sample_date());
        let wire = PlainJson.serialize(&value).unwrap();
        assert_eq!(wire, json!({"at": "2023-10-01T12:30:00.000Z"}));
        // the date comes back as the string it was flattened to
        assert_eq!(
            PlainJson.deserialize(wire).unwrap().get("at"),
            Some(&RichValue::string("2023-10-01T12:30:00.000Z"))
        );
    }
}
