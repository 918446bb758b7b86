//! Unit and quantity conversions.

use std::sync::Arc;

use forecast_common::{FieldRef, FieldSet, MetaValue, Result};
use tracing::debug;

use crate::stage::Stage;
use crate::wrap::{MetadataOverride, ValueOverride};

/// Standard gravity in m s-2.
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Multiplies every field tagged `param == source` by `factor` and tags
/// the result as `target`. The source field is replaced, not kept.
#[derive(Debug, Clone)]
pub struct UnitConversion {
    source: String,
    target: String,
    factor: f64,
}

impl UnitConversion {
    pub fn new(source: impl Into<String>, target: impl Into<String>, factor: f64) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            factor,
        }
    }

    /// Geopotential height (`gh`) to geopotential (`z`).
    pub fn geopotential_from_height() -> Self {
        Self::new("gh", "z", STANDARD_GRAVITY)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn matches(&self, field: &FieldRef) -> bool {
        matches!(field.metadata("param"), Some(MetaValue::Str(p)) if p == self.source)
    }

    fn convert(&self, field: FieldRef) -> FieldRef {
        let values = field.values().iter().map(|v| v * self.factor).collect();
        let scaled: FieldRef = Arc::new(ValueOverride::new(field, values));
        Arc::new(MetadataOverride::single(scaled, "param", self.target.as_str()))
    }
}

impl Stage for UnitConversion {
    fn name(&self) -> &str {
        "unit-conversion"
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        let mut converted = 0usize;
        let out: FieldSet = fields
            .into_iter()
            .map(|field| {
                if self.matches(&field) {
                    converted += 1;
                    self.convert(field)
                } else {
                    field
                }
            })
            .collect();

        if converted > 0 {
            debug!(
                source = %self.source,
                target = %self.target,
                count = converted,
                "Converted fields"
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::{BaseField, Metadata};

    fn field(param: &str, values: Vec<f64>) -> FieldRef {
        BaseField::new(values, Metadata::new())
            .with("param", param)
            .with("levtype", "pl")
            .into_ref()
    }

    #[test]
    fn test_gh_becomes_z() {
        let input: FieldSet = vec![field("gh", vec![1000.0]), field("t", vec![280.0])]
            .into_iter()
            .collect();
        let out = UnitConversion::geopotential_from_height().apply(input).unwrap();

        assert_eq!(out.len(), 2);
        let z = out.get(0).unwrap();
        assert_eq!(z.metadata("param"), Some(MetaValue::from("z")));
        assert_eq!(z.values(), &[1000.0 * 9.80665]);
        assert_eq!(z.metadata("levtype"), Some(MetaValue::from("pl")));
        assert!(out.sel("param", &[MetaValue::from("gh")]).is_empty());

        let t = out.get(1).unwrap();
        assert_eq!(t.values(), &[280.0]);
    }

    #[test]
    fn test_absent_source_is_noop() {
        let input: FieldSet = vec![field("t", vec![1.0])].into_iter().collect();
        let out = UnitConversion::geopotential_from_height().apply(input).unwrap();
        assert_eq!(out.params(), vec!["t"]);
        assert_eq!(out.get(0).unwrap().values(), &[1.0]);
    }

    #[test]
    fn test_exact_param_match_only() {
        let input: FieldSet = vec![field("ghx", vec![1.0])].into_iter().collect();
        let out = UnitConversion::geopotential_from_height().apply(input).unwrap();
        assert_eq!(out.params(), vec!["ghx"]);
    }
}
