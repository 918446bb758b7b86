//! Relabelling stage: one metadata override for a whole field set.

use std::sync::Arc;

use forecast_common::{FieldRef, FieldSet, MetaValue, Metadata, Result};

use crate::stage::Stage;
use crate::wrap::MetadataOverride;

/// Applies the same metadata override to every field.
#[derive(Debug, Clone, Default)]
pub struct Relabel {
    patch: Metadata,
}

impl Relabel {
    pub fn new(patch: Metadata) -> Self {
        Self { patch }
    }

    /// Add one key to the override.
    pub fn set(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.patch.insert(key.to_string(), value.into());
        self
    }

    /// Hide `key` on every field.
    pub fn clear(self, key: &str) -> Self {
        self.set(key, MetaValue::Null)
    }
}

impl Stage for Relabel {
    fn name(&self) -> &str {
        "relabel"
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        if self.patch.is_empty() {
            return Ok(fields);
        }
        Ok(fields
            .into_iter()
            .map(|f| Arc::new(MetadataOverride::new(f, self.patch.clone())) as FieldRef)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::BaseField;

    #[test]
    fn test_relabel_every_field() {
        let fields: FieldSet = ["2t", "msl"]
            .iter()
            .map(|p| {
                BaseField::new(vec![0.0], Metadata::new())
                    .with("param", *p)
                    .with("levelist", 0i64)
                    .into_ref()
            })
            .collect();

        let out = Relabel::default()
            .clear("levelist")
            .set("expver", "0001")
            .apply(fields)
            .unwrap();

        for f in &out {
            assert_eq!(f.metadata("levelist"), None);
            assert_eq!(f.metadata("expver"), Some(MetaValue::from("0001")));
        }
        assert_eq!(out.params(), vec!["2t", "msl"]);
    }
}
