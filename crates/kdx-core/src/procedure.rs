//! Remote Procedure Contract
//!
//! A procedure is a marker type shared by the caller and the server. The
//! client facade and the server router both key off the same `PATH`,
//! `KIND`, `Input` and `Output`, so a mismatch is a compile error rather
//! than a runtime surprise.
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use crate::data_model::{OperationKind, RichValue};
use crate::error::KdxError;

pub trait Procedure: Send + Sync + 'static {
    /// Dotted path the procedure is mounted at
    const PATH: &'static str;
    const KIND: OperationKind;
    type Input: IntoRich + FromRich + Send + 'static;
    type Output: IntoRich + FromRich + Send + 'static;
}

pub trait IntoRich {
    fn into_rich(self) -> Result<RichValue, KdxError>;
}

pub trait FromRich: Sized {
    fn from_rich(value: RichValue) -> Result<Self, KdxError>;
}

fn mismatch(expected: &str, got: &RichValue) -> KdxError {
    KdxError::Transform(format!("expected {}, got {}", expected, got.type_name()))
}

impl IntoRich for RichValue {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(self)
    }
}

impl FromRich for RichValue {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        Ok(value)
    }
}

impl IntoRich for () {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(RichValue::Undefined)
    }
}

impl FromRich for () {
    fn from_rich(_: RichValue) -> Result<Self, KdxError> {
        Ok(())
    }
}

impl IntoRich for bool {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(RichValue::Bool(self))
    }
}

impl FromRich for bool {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        match value {
            RichValue::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl IntoRich for String {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(RichValue::String(self))
    }
}

impl FromRich for String {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        match value {
            RichValue::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl IntoRich for f64 {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(RichValue::Number(self))
    }
}

impl FromRich for f64 {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        match value {
            RichValue::Number(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

macro_rules! integer_rich {
    ($($t:ty),*) => {$(
        impl IntoRich for $t {
            fn into_rich(self) -> Result<RichValue, KdxError> {
                Ok(RichValue::Number(self as f64))
            }
        }

        impl FromRich for $t {
            fn from_rich(value: RichValue) -> Result<Self, KdxError> {
                match value {
                    // `MAX as f64` rounds up to 2^bits for 64-bit types; the
                    // exclusive bound is exact for every width.
                    RichValue::Number(n)
                        if n.fract() == 0.0 && n >= <$t>::MIN as f64 && n < <$t>::MAX as f64 + 1.0 =>
                    {
                        Ok(n as $t)
                    }
                    RichValue::Number(n) => Err(KdxError::Transform(format!(
                        "{} does not fit {}",
                        n,
                        stringify!($t)
                    ))),
                    other => Err(mismatch("number", &other)),
                }
            }
        }
    )*};
}

integer_rich!(i32, i64, u32, u64, usize);

impl IntoRich for i128 {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(RichValue::BigInt(self))
    }
}

impl FromRich for i128 {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        match value {
            RichValue::BigInt(i) => Ok(i),
            other => Err(mismatch("bigint", &other)),
        }
    }
}

impl IntoRich for DateTime<Utc> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        Ok(RichValue::date(self))
    }
}

impl FromRich for DateTime<Utc> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        match value {
            RichValue::Date(d) => Ok(d),
            other => Err(mismatch("Date", &other)),
        }
    }
}

impl<T: IntoRich> IntoRich for Option<T> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        match self {
            Some(v) => v.into_rich(),
            None => Ok(RichValue::Undefined),
        }
    }
}

impl<T: FromRich> FromRich for Option<T> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        if value.is_nullish() {
            Ok(None)
        } else {
            T::from_rich(value).map(Some)
        }
    }
}

impl<T: IntoRich> IntoRich for Vec<T> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        self.into_iter()
            .map(IntoRich::into_rich)
            .collect::<Result<_, _>>()
            .map(RichValue::Array)
    }
}

impl<T: FromRich> FromRich for Vec<T> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        match value {
            RichValue::Array(items) => items.into_iter().map(T::from_rich).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}

fn set_items(value: RichValue) -> Result<Vec<RichValue>, KdxError> {
    match value {
        RichValue::Set(items) => Ok(items),
        other => Err(mismatch("Set", &other)),
    }
}

fn set_from<T: IntoRich>(items: impl IntoIterator<Item = T>) -> Result<RichValue, KdxError> {
    items
        .into_iter()
        .map(IntoRich::into_rich)
        .collect::<Result<_, _>>()
        .map(RichValue::Set)
}

fn map_from<K: IntoRich, V: IntoRich>(
    entries: impl IntoIterator<Item = (K, V)>,
) -> Result<RichValue, KdxError> {
    entries
        .into_iter()
        .map(|(k, v)| Ok((k.into_rich()?, v.into_rich()?)))
        .collect::<Result<_, KdxError>>()
        .map(RichValue::Map)
}

fn map_entries(value: RichValue) -> Result<Vec<(RichValue, RichValue)>, KdxError> {
    match value {
        RichValue::Map(entries) => Ok(entries),
        other => Err(mismatch("Map", &other)),
    }
}

impl<T: IntoRich> IntoRich for HashSet<T> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        set_from(self)
    }
}

impl<T: FromRich + Eq + Hash> FromRich for HashSet<T> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        set_items(value)?.into_iter().map(T::from_rich).collect()
    }
}

impl<T: IntoRich> IntoRich for BTreeSet<T> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        set_from(self)
    }
}

impl<T: FromRich + Ord> FromRich for BTreeSet<T> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        set_items(value)?.into_iter().map(T::from_rich).collect()
    }
}

impl<K: IntoRich, V: IntoRich> IntoRich for HashMap<K, V> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        map_from(self)
    }
}

impl<K: FromRich + Eq + Hash, V: FromRich> FromRich for HashMap<K, V> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        map_entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_rich(k)?, V::from_rich(v)?)))
            .collect()
    }
}

impl<K: IntoRich, V: IntoRich> IntoRich for BTreeMap<K, V> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        map_from(self)
    }
}

impl<K: FromRich + Ord, V: FromRich> FromRich for BTreeMap<K, V> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        map_entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_rich(k)?, V::from_rich(v)?)))
            .collect()
    }
}

/// Carries any serde type as plain JSON. Dates inside become strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoRich for Json<T> {
    fn into_rich(self) -> Result<RichValue, KdxError> {
        serde_json::to_value(&self.0)
            .map(RichValue::from_plain)
            .map_err(|e| KdxError::Transform(format!("value has no JSON form: {}", e)))
    }
}

impl<T: DeserializeOwned> FromRich for Json<T> {
    fn from_rich(value: RichValue) -> Result<Self, KdxError> {
        let plain = value.to_plain()?;
        serde_json::from_value(plain)
            .map(Json)
            .map_err(|e| KdxError::Transform(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[test]
    fn test_option_maps_to_undefined() {
        assert_eq!(None::<String>.into_rich().unwrap(), RichValue::Undefined);
        assert_eq!(Option::<String>::from_rich(RichValue::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_rich(RichValue::string("x")).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_integers_are_checked() {
        assert_eq!(u32::from_rich(RichValue::Number(7.0)).unwrap(), 7);
        assert!(u32::from_rich(RichValue::Number(-1.0)).is_err());
        assert!(i64::from_rich(RichValue::Number(1.5)).is_err());
        assert!(i32::from_rich(RichValue::string("1")).is_err());
    }

    #[test]
    fn test_integer_bounds_are_exclusive_at_two_to_the_bits() {
        let two_63 = 9_223_372_036_854_775_808.0;
        assert!(i64::from_rich(RichValue::Number(two_63)).is_err());
        assert_eq!(i64::from_rich(RichValue::Number(-two_63)).unwrap(), i64::MIN);
        assert!(u64::from_rich(RichValue::Number(18_446_744_073_709_551_616.0)).is_err());
        assert!(i32::from_rich(RichValue::Number(2_147_483_648.0)).is_err());
        assert_eq!(i32::from_rich(RichValue::Number(2_147_483_647.0)).unwrap(), i32::MAX);
    }

    #[test]
    fn test_json_wrapper_reports_unserializable_values() {
        let mut by_pair = HashMap::new();
        by_pair.insert((1, 2), 3);
        let err = Json(by_pair).into_rich().unwrap_err();
        assert!(matches!(err, KdxError::Transform(_)));
    }

    #[test]
    fn test_collections_use_rich_containers() {
        let mut scores = HashMap::new();
        scores.insert("ana".to_string(), 3_u32);
        let rich = scores.clone().into_rich().unwrap();
        assert!(matches!(rich, RichValue::Map(_)));
        assert_eq!(HashMap::<String, u32>::from_rich(rich).unwrap(), scores);

        let tags: BTreeSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let rich = tags.clone().into_rich().unwrap();
        assert!(matches!(rich, RichValue::Set(_)));
        assert_eq!(BTreeSet::<String>::from_rich(rich).unwrap(), tags);
    }

    #[test]
    fn test_date_conversion() {
        let at = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(DateTime::<Utc>::from_rich(at.into_rich().unwrap()).unwrap(), at);
        assert!(DateTime::<Utc>::from_rich(RichValue::string("2024-02-29")).is_err());
    }

    #[test]
    fn test_json_wrapper() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Point {
            x: i32,
            y: i32,
        }

        let rich = Json(Point { x: 1, y: -2 }).into_rich().unwrap();
        assert_eq!(rich.get("x"), Some(&RichValue::Number(1.0)));
        let Json(back) = Json::<Point>::from_rich(rich).unwrap();
        assert_eq!(back, Point { x: 1, y: -2 });
    }
}
