//! Retrieval and archive request dictionaries.
//!
//! A request is an insertion-ordered mapping from key to a scalar or a list
//! of scalars. Insertion order is kept for JSON output; the canonical form
//! (used for equality and text rendering) sorts keys, and sorts list values
//! except for geometry keys whose order is meaningful.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::field::MetaValue;

/// Keys whose list values keep their input order.
pub const GEOMETRY_KEYS: &[&str] = &["area", "grid", "frame", "rotation", "bitmap"];

/// A request value: one scalar or an ordered list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestValue {
    List(Vec<MetaValue>),
    Scalar(MetaValue),
}

impl RequestValue {
    pub fn list<T: Into<MetaValue>>(items: impl IntoIterator<Item = T>) -> Self {
        RequestValue::List(items.into_iter().map(Into::into).collect())
    }

    /// All values, a scalar counting as a one-element list.
    pub fn items(&self) -> Vec<MetaValue> {
        match self {
            RequestValue::List(items) => items.clone(),
            RequestValue::Scalar(v) => vec![v.clone()],
        }
    }

    /// String forms of the values, sorted unless `key` is a geometry key.
    ///
    /// Numbers sort numerically when every value is numeric.
    pub fn canonical_strings(&self, key: &str) -> Vec<String> {
        let mut items = self.items();
        if !GEOMETRY_KEYS.contains(&key) {
            let numeric = items
                .iter()
                .all(|v| matches!(v, MetaValue::Int(_) | MetaValue::Float(_)));
            if numeric {
                items.sort_by(|a, b| {
                    let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                    a.total_cmp(&b)
                });
            } else {
                items.sort_by_key(|v| v.to_string());
            }
        }
        items.iter().map(|v| v.to_string()).collect()
    }
}

impl From<MetaValue> for RequestValue {
    fn from(v: MetaValue) -> Self {
        RequestValue::Scalar(v)
    }
}

impl From<&str> for RequestValue {
    fn from(v: &str) -> Self {
        RequestValue::Scalar(v.into())
    }
}

impl From<String> for RequestValue {
    fn from(v: String) -> Self {
        RequestValue::Scalar(v.into())
    }
}

impl From<i64> for RequestValue {
    fn from(v: i64) -> Self {
        RequestValue::Scalar(v.into())
    }
}

impl From<u32> for RequestValue {
    fn from(v: u32) -> Self {
        RequestValue::Scalar(v.into())
    }
}

impl From<Vec<String>> for RequestValue {
    fn from(v: Vec<String>) -> Self {
        RequestValue::list(v)
    }
}

impl From<Vec<&str>> for RequestValue {
    fn from(v: Vec<&str>) -> Self {
        RequestValue::list(v)
    }
}

impl From<Vec<i64>> for RequestValue {
    fn from(v: Vec<i64>) -> Self {
        RequestValue::list(v)
    }
}

impl From<Vec<f64>> for RequestValue {
    fn from(v: Vec<f64>) -> Self {
        RequestValue::list(v)
    }
}

/// An insertion-ordered request dictionary.
#[derive(Debug, Clone, Default)]
pub struct RetrieveRequest {
    entries: Vec<(String, RequestValue)>,
}

impl RetrieveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a key. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RequestValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<RequestValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&RequestValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<RequestValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RequestValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: &RetrieveRequest) {
        for (k, v) in other.iter() {
            self.insert(k, v.clone());
        }
    }

    /// Values of `key` as strings (scalars count as one-element lists).
    pub fn strings(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| v.items().iter().map(|i| i.to_string()).collect())
            .unwrap_or_default()
    }

    /// Scalar value of `key`, if the key holds a scalar.
    pub fn scalar(&self, key: &str) -> Option<&MetaValue> {
        match self.get(key)? {
            RequestValue::Scalar(v) => Some(v),
            RequestValue::List(items) if items.len() == 1 => items.first(),
            RequestValue::List(_) => None,
        }
    }

    /// Canonical form: sorted keys, canonically ordered string values.
    pub fn canonical(&self) -> BTreeMap<String, Vec<String>> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.canonical_strings(k)))
            .collect()
    }
}

impl PartialEq for RetrieveRequest {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl fmt::Display for RetrieveRequest {
    /// One-line `key=v1/v2, key2=v` form, sorted by key.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .canonical()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v.join("/")))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl Serialize for RetrieveRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RetrieveRequest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_json without preserve_order yields sorted keys here
        let map = BTreeMap::<String, RequestValue>::deserialize(deserializer)?;
        let mut request = RetrieveRequest::new();
        for (k, v) in map {
            request.insert(k, v);
        }
        Ok(request)
    }
}

/// Owner-supplied hook that may add or override request keys.
///
/// Applied to every retrieval request right after it is built.
pub trait RequestPatch: Send + Sync {
    fn patch(&self, request: &mut RetrieveRequest);
}

/// The default hook: leaves requests untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPatch;

impl RequestPatch for NoPatch {
    fn patch(&self, _request: &mut RetrieveRequest) {}
}

impl<F> RequestPatch for F
where
    F: Fn(&mut RetrieveRequest) + Send + Sync,
{
    fn patch(&self, request: &mut RetrieveRequest) {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut r = RetrieveRequest::new().with("levtype", "pl").with("param", "t");
        r.insert("levtype", "sfc");
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["levtype", "param"]);
        assert_eq!(r.scalar("levtype"), Some(&MetaValue::from("sfc")));
    }

    #[test]
    fn test_canonical_sorts_except_geometry() {
        let r = RetrieveRequest::new()
            .with("levelist", vec![850i64, 50, 500])
            .with("param", vec!["v", "t", "u"])
            .with("area", vec![90.0, 0.0, -90.0, 360.0]);

        let c = r.canonical();
        assert_eq!(c["levelist"], vec!["50", "500", "850"]);
        assert_eq!(c["param"], vec!["t", "u", "v"]);
        assert_eq!(c["area"], vec!["90", "0", "-90", "360"]);
    }

    #[test]
    fn test_equality_ignores_list_order() {
        let a = RetrieveRequest::new().with("param", vec!["t", "u"]);
        let b = RetrieveRequest::new().with("param", vec!["u", "t"]);
        assert_eq!(a, b);

        let g1 = RetrieveRequest::new().with("grid", vec![0.25, 0.5]);
        let g2 = RetrieveRequest::new().with("grid", vec![0.5, 0.25]);
        assert_ne!(g1, g2);
    }

    #[test]
    fn test_json_keeps_insertion_order() {
        let r = RetrieveRequest::new()
            .with("levtype", "sfc")
            .with("param", vec!["2t", "msl"])
            .with("date", 20230101i64);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(
            json,
            r#"{"levtype":"sfc","param":["2t","msl"],"date":20230101}"#
        );
    }

    #[test]
    fn test_display() {
        let r = RetrieveRequest::new()
            .with("param", vec!["u", "t"])
            .with("levtype", "pl");
        assert_eq!(r.to_string(), "levtype=pl, param=t/u");
    }
}
