//! Field wrappers.
//!
//! A wrapper owns a handle to exactly one inner field and answers some
//! lookups itself; everything else falls through to the inner field.
//! Wrappers can wrap wrappers. Since a wrapper is built from an existing
//! inner handle, a chain can never loop back on itself.

use std::collections::BTreeSet;

use forecast_common::{Field, FieldRef, MetaValue, Metadata};

/// Replaces the numeric payload of a field.
///
/// Metadata passes through. The shape follows the new payload: it is the
/// inner shape when the lengths agree, a flat vector otherwise, unless
/// an explicit shape is supplied.
#[derive(Debug)]
pub struct ValueOverride {
    inner: FieldRef,
    values: Vec<f64>,
    shape: Option<Vec<usize>>,
}

impl ValueOverride {
    pub fn new(inner: FieldRef, values: Vec<f64>) -> Self {
        Self {
            inner,
            values,
            shape: None,
        }
    }

    /// Attach the shape of the new payload (e.g. `[nj, ni]` after regridding).
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn inner(&self) -> &FieldRef {
        &self.inner
    }
}

impl Field for ValueOverride {
    fn values(&self) -> &[f64] {
        &self.values
    }

    fn metadata(&self, key: &str) -> Option<MetaValue> {
        self.inner.metadata(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn shape(&self) -> Vec<usize> {
        if let Some(shape) = &self.shape {
            return shape.clone();
        }
        if self.values.len() == self.inner.values().len() {
            self.inner.shape()
        } else {
            vec![self.values.len()]
        }
    }
}

/// Replaces the result of selected metadata lookups.
///
/// A patch value of [`MetaValue::Null`] hides the key: lookups report it
/// as absent even when the inner field has it.
#[derive(Debug)]
pub struct MetadataOverride {
    inner: FieldRef,
    patch: Metadata,
}

impl MetadataOverride {
    pub fn new(inner: FieldRef, patch: Metadata) -> Self {
        Self { inner, patch }
    }

    /// Wrap with a single key override.
    pub fn single(inner: FieldRef, key: &str, value: impl Into<MetaValue>) -> Self {
        let mut patch = Metadata::new();
        patch.insert(key.to_string(), value.into());
        Self { inner, patch }
    }

    pub fn inner(&self) -> &FieldRef {
        &self.inner
    }

    pub fn patch(&self) -> &Metadata {
        &self.patch
    }
}

impl Field for MetadataOverride {
    fn values(&self) -> &[f64] {
        self.inner.values()
    }

    fn metadata(&self, key: &str) -> Option<MetaValue> {
        match self.patch.get(key) {
            Some(MetaValue::Null) => None,
            Some(value) => Some(value.clone()),
            None => self.inner.metadata(key),
        }
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.inner.keys().into_iter().collect();
        for (key, value) in &self.patch {
            if value.is_null() {
                keys.remove(key);
            } else {
                keys.insert(key.clone());
            }
        }
        keys.into_iter().collect()
    }

    fn shape(&self) -> Vec<usize> {
        self.inner.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::BaseField;
    use std::sync::Arc;

    fn inner() -> FieldRef {
        BaseField::new(vec![1.0, 2.0, 3.0, 4.0], Metadata::new())
            .with_shape(vec![2, 2])
            .with("param", "gh")
            .with("levtype", "pl")
            .with("levelist", 500i64)
            .into_ref()
    }

    #[test]
    fn test_metadata_override_falls_through() {
        let base = inner();
        let wrapped = MetadataOverride::single(base.clone(), "param", "z");

        assert_eq!(wrapped.metadata("param"), Some(MetaValue::from("z")));
        assert_eq!(wrapped.metadata("levtype"), Some(MetaValue::from("pl")));
        assert_eq!(wrapped.values(), base.values());
        assert_eq!(wrapped.shape(), vec![2, 2]);
    }

    #[test]
    fn test_metadata_override_null_masks_key() {
        let wrapped = MetadataOverride::single(inner(), "levelist", MetaValue::Null);
        assert_eq!(wrapped.metadata("levelist"), None);
        assert!(!wrapped.keys().contains(&"levelist".to_string()));
    }

    #[test]
    fn test_value_override_shape() {
        let same = ValueOverride::new(inner(), vec![0.0; 4]);
        assert_eq!(same.shape(), vec![2, 2]);

        let longer = ValueOverride::new(inner(), vec![0.0; 9]);
        assert_eq!(longer.shape(), vec![9]);

        let shaped = ValueOverride::new(inner(), vec![0.0; 9]).with_shape(vec![3, 3]);
        assert_eq!(shaped.shape(), vec![3, 3]);
        assert_eq!(shaped.metadata("param"), Some(MetaValue::from("gh")));
    }

    #[test]
    fn test_wrappers_compose() {
        let values = Arc::new(ValueOverride::new(inner(), vec![9.0; 4]));
        let relabeled = MetadataOverride::single(values, "param", "z");

        assert_eq!(relabeled.values(), &[9.0; 4]);
        assert_eq!(relabeled.metadata("param"), Some(MetaValue::from("z")));
        assert_eq!(relabeled.metadata("levelist"), Some(MetaValue::Int(500)));
    }
}
