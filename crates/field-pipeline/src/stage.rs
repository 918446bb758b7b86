//! Transformation stages and their composition.

use std::sync::Arc;

use forecast_common::{FieldSet, Result};
use tracing::debug;

/// A transformation from one field set to another.
///
/// Stages never mutate their input fields; they return new handles, either
/// the originals or wrappers around them. A stage sees the complete output
/// of the previous stage.
pub trait Stage: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    fn apply(&self, fields: FieldSet) -> Result<FieldSet>;
}

impl<S: Stage + ?Sized> Stage for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        (**self).apply(fields)
    }
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        (**self).apply(fields)
    }
}

/// Pass-through stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Stage for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        Ok(fields)
    }
}

/// Stages applied in strict order.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn then<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append a stage if present.
    pub fn then_some<S: Stage + 'static>(self, stage: Option<S>) -> Self {
        match stage {
            Some(stage) => self.then(stage),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Stage for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        let mut fields = fields;
        for stage in &self.stages {
            let count = fields.len();
            fields = stage.apply(fields)?;
            debug!(stage = stage.name(), input = count, output = fields.len(), "Applied stage");
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrap::MetadataOverride;
    use forecast_common::{BaseField, FieldRef, MetaValue, Metadata};

    struct Tag(&'static str);

    impl Stage for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
            Ok(fields
                .into_iter()
                .map(|f| {
                    let trail = f
                        .metadata("trail")
                        .map(|v| format!("{}{}", v, self.0))
                        .unwrap_or_else(|| self.0.to_string());
                    Arc::new(MetadataOverride::single(f, "trail", trail)) as FieldRef
                })
                .collect())
        }
    }

    #[test]
    fn test_pipeline_runs_in_order() {
        let pipeline = Pipeline::new().then(Tag("a")).then(Identity).then(Tag("b"));
        assert_eq!(pipeline.names(), vec!["a", "identity", "b"]);

        let input: FieldSet = vec![BaseField::new(vec![1.0], Metadata::new()).into_ref()]
            .into_iter()
            .collect();
        let output = pipeline.apply(input).unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output.iter().next().unwrap().metadata("trail"), Some(MetaValue::from("ab")));
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::new().then_some(None::<Identity>);
        assert!(pipeline.is_empty());
        let output = pipeline.apply(FieldSet::empty()).unwrap();
        assert!(output.is_empty());
    }
}
