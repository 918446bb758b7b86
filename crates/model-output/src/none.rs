//! Output that drops every result field.

use forecast_common::{FieldRef, Result};
use tracing::info;

use crate::output::{FieldOutput, Overrides, Written};

/// Discards every field.
#[derive(Debug)]
pub struct NoneOutput;

impl NoneOutput {
    pub fn new() -> Self {
        info!("Results will not be written");
        NoneOutput
    }
}

impl Default for NoneOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldOutput for NoneOutput {
    fn write(&mut self, _values: Option<&[f64]>, _template: &FieldRef, _overrides: Overrides) -> Result<Option<Written>> {
        Ok(None)
    }
}
