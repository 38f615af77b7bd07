//! Report document values.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use cuckoo_dxl_common::timestamp::{epoch_seconds, naive_epoch_seconds};
use cuckoo_dxl_common::Error;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A mapping level inside a report.
pub type ReportMap = BTreeMap<String, ReportValue>;

/// Any value that can appear in an analysis report.
///
/// Datetimes serialize as epoch seconds. `Binary` values and non-finite
/// floats have no JSON form and fail serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
    NaiveDateTime(NaiveDateTime),
    List(Vec<ReportValue>),
    Map(ReportMap),
    Binary(Vec<u8>),
}

impl ReportValue {
    /// An empty mapping.
    pub fn empty_map() -> Self {
        ReportValue::Map(ReportMap::new())
    }

    /// The inner mapping, if this value is one.
    pub fn as_map(&self) -> Option<&ReportMap> {
        match self {
            ReportValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the value's type, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ReportValue::Null => "null",
            ReportValue::Bool(_) => "bool",
            ReportValue::Integer(_) => "integer",
            ReportValue::Float(_) => "float",
            ReportValue::String(_) => "string",
            ReportValue::DateTime(_) | ReportValue::NaiveDateTime(_) => "datetime",
            ReportValue::List(_) => "list",
            ReportValue::Map(_) => "mapping",
            ReportValue::Binary(_) => "binary",
        }
    }
}

impl Serialize for ReportValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReportValue::Null => serializer.serialize_unit(),
            ReportValue::Bool(b) => serializer.serialize_bool(*b),
            ReportValue::Integer(i) => serializer.serialize_i64(*i),
            ReportValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            ReportValue::Float(f) => Err(ser::Error::custom(format!(
                "{} is not JSON serializable",
                f
            ))),
            ReportValue::String(s) => serializer.serialize_str(s),
            ReportValue::DateTime(dt) => serializer.serialize_f64(epoch_seconds(dt)),
            ReportValue::NaiveDateTime(dt) => serializer.serialize_f64(naive_epoch_seconds(dt)),
            ReportValue::List(items) => items.serialize(serializer),
            ReportValue::Map(map) => map.serialize(serializer),
            ReportValue::Binary(bytes) => Err(ser::Error::custom(format!(
                "binary value of {} bytes is not JSON serializable",
                bytes.len()
            ))),
        }
    }
}

struct ReportValueVisitor;

impl<'de> Visitor<'de> for ReportValueVisitor {
    type Value = ReportValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ReportValue, E> {
        Ok(ReportValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ReportValue, E> {
        Ok(ReportValue::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ReportValue, E> {
        Ok(match i64::try_from(v) {
            Ok(i) => ReportValue::Integer(i),
            Err(_) => ReportValue::Float(v as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ReportValue, E> {
        Ok(ReportValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ReportValue, E> {
        Ok(ReportValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<ReportValue, E> {
        Ok(ReportValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ReportValue, E> {
        Ok(ReportValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ReportValue, E> {
        Ok(ReportValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ReportValue, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ReportValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ReportValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ReportValue, A::Error> {
        let mut map = ReportMap::new();
        while let Some((key, value)) = access.next_entry::<String, ReportValue>()? {
            map.insert(key, value);
        }
        Ok(ReportValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for ReportValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ReportValueVisitor)
    }
}

impl From<serde_json::Value> for ReportValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => ReportValue::Null,
            Value::Bool(b) => ReportValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ReportValue::Integer(i),
                None => ReportValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ReportValue::String(s),
            Value::Array(items) => ReportValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                ReportValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for ReportValue {
    fn from(s: &str) -> Self {
        ReportValue::String(s.to_string())
    }
}

impl From<String> for ReportValue {
    fn from(s: String) -> Self {
        ReportValue::String(s)
    }
}

impl From<i64> for ReportValue {
    fn from(i: i64) -> Self {
        ReportValue::Integer(i)
    }
}

impl From<f64> for ReportValue {
    fn from(f: f64) -> Self {
        ReportValue::Float(f)
    }
}

impl From<bool> for ReportValue {
    fn from(b: bool) -> Self {
        ReportValue::Bool(b)
    }
}

impl From<DateTime<FixedOffset>> for ReportValue {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        ReportValue::DateTime(dt)
    }
}

impl From<NaiveDateTime> for ReportValue {
    fn from(dt: NaiveDateTime) -> Self {
        ReportValue::NaiveDateTime(dt)
    }
}

impl From<ReportMap> for ReportValue {
    fn from(map: ReportMap) -> Self {
        ReportValue::Map(map)
    }
}

/// A completed analysis report.
///
/// The top level is always a mapping. The report is read-only input for
/// projection and publishing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisReport(ReportMap);

impl AnalysisReport {
    /// Wrap the top-level sections of a report.
    pub fn new(sections: ReportMap) -> Self {
        Self(sections)
    }

    /// Top-level section by name.
    pub fn get(&self, key: &str) -> Option<&ReportValue> {
        self.0.get(key)
    }

    /// Descend key by key; `None` as soon as a key is absent or a level is
    /// not a mapping.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&ReportValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(first.as_ref())?;
        for key in rest {
            current = current.as_map()?.get(key.as_ref())?;
        }
        Some(current)
    }
}

impl From<ReportMap> for AnalysisReport {
    fn from(sections: ReportMap) -> Self {
        Self(sections)
    }
}

impl FromIterator<(String, ReportValue)> for AnalysisReport {
    fn from_iter<I: IntoIterator<Item = (String, ReportValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<serde_json::Value> for AnalysisReport {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match ReportValue::from(value) {
            ReportValue::Map(map) => Ok(Self(map)),
            other => Err(Error::Serialization(format!(
                "analysis report must be a mapping, got {}",
                other.kind()
            ))),
        }
    }
}
