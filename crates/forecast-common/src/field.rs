//! The field model: one scientific data record with values and metadata.
//!
//! Fields are immutable and shared by reference (`Arc<dyn Field>`). Code
//! that needs to change what a field reports wraps it instead of mutating
//! it (see the `field-pipeline` crate).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Metadata keys shown when a field is described in error messages.
const DESCRIBE_KEYS: &[&str] = &["param", "levtype", "levelist", "date", "time", "step"];

/// A single metadata value.
///
/// `Null` stands for "no value"; lookups never report it as present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn is_null(&self) -> bool {
        matches!(self, MetaValue::Null)
    }

    /// Integer view of the value, parsing strings and integral floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(*v),
            MetaValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            MetaValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Int(v) => Some(*v as f64),
            MetaValue::Float(v) => Some(*v),
            MetaValue::Str(s) => s.trim().parse().ok(),
            MetaValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values the way request bookkeeping does: by their
    /// canonical string form, so `500` and `"500"` are the same level.
    pub fn same_as(&self, other: &MetaValue) -> bool {
        self.to_string() == other.to_string()
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => write!(f, "null"),
            MetaValue::Int(v) => write!(f, "{}", v),
            MetaValue::Float(v) => write!(f, "{}", v),
            MetaValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<u32> for MetaValue {
    fn from(v: u32) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetaValue::Null)
    }
}

/// Ordered key/value metadata.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A scientific data record: a numeric payload plus metadata lookups.
///
/// Every accessor a wrapper needs to pass through is part of this trait;
/// there is no implicit delegation.
pub trait Field: fmt::Debug + Send + Sync {
    /// The numeric payload, flattened.
    fn values(&self) -> &[f64];

    /// Look up one metadata key. `None` when absent or null.
    fn metadata(&self, key: &str) -> Option<MetaValue>;

    /// All metadata keys this field can answer.
    fn keys(&self) -> Vec<String>;

    /// Shape of the payload. Defaults to a flat vector.
    fn shape(&self) -> Vec<usize> {
        vec![self.values().len()]
    }

    /// Parameter name, preferring `param` over `shortName`.
    fn param(&self) -> Option<String> {
        self.metadata("param")
            .or_else(|| self.metadata("shortName"))
            .map(|v| v.to_string())
    }

    /// Snapshot of all present metadata.
    fn metadata_map(&self) -> Metadata {
        self.keys()
            .into_iter()
            .filter_map(|k| self.metadata(&k).map(|v| (k, v)))
            .collect()
    }

    /// Short human-readable identification used in error messages.
    fn describe(&self) -> String {
        let parts: Vec<String> = DESCRIBE_KEYS
            .iter()
            .filter_map(|k| self.metadata(k).map(|v| format!("{}={}", k, v)))
            .collect();
        format!("Field({})", parts.join(", "))
    }
}

/// Shared handle to a field.
pub type FieldRef = Arc<dyn Field>;

/// A field that owns its values and metadata.
#[derive(Debug, Clone, Default)]
pub struct BaseField {
    values: Vec<f64>,
    metadata: Metadata,
    shape: Option<Vec<usize>>,
}

impl BaseField {
    pub fn new(values: Vec<f64>, metadata: Metadata) -> Self {
        Self {
            values,
            metadata,
            shape: None,
        }
    }

    /// Attach a 2D (or higher) shape to the flat payload.
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Builder-style metadata insertion.
    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn into_ref(self) -> FieldRef {
        Arc::new(self)
    }
}

impl Field for BaseField {
    fn values(&self) -> &[f64] {
        &self.values
    }

    fn metadata(&self, key: &str) -> Option<MetaValue> {
        self.metadata.get(key).filter(|v| !v.is_null()).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.metadata
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn shape(&self) -> Vec<usize> {
        self.shape
            .clone()
            .unwrap_or_else(|| vec![self.values.len()])
    }
}
