//! The write boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use forecast_common::{FieldRef, MetaValue, Metadata, Result};

/// Keys reported by [`WrittenHandle::as_mars`], when present.
pub const MARS_KEYS: &[&str] = &[
    "class",
    "type",
    "stream",
    "expver",
    "date",
    "hdate",
    "referenceDate",
    "time",
    "step",
    "number",
    "levtype",
    "levelist",
    "param",
];

/// Metadata to set on one written field.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub keys: Metadata,
    /// Verify that every requested key made it into the written field.
    /// `None` leaves the decision to the output.
    pub check: Option<bool>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.keys.insert(key.to_string(), value.into());
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = Some(check);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.keys.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.keys.remove(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetaValue>) {
        self.keys.insert(key.to_string(), value.into());
    }
}

impl From<Metadata> for Overrides {
    fn from(keys: Metadata) -> Self {
        Self { keys, check: None }
    }
}

/// Metadata of a field as it was written.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WrittenHandle {
    metadata: Metadata,
}

impl WrittenHandle {
    pub fn new(metadata: Metadata) -> Self {
        Self { metadata }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.metadata.get(key).filter(|v| !v.is_null())
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Archive keys of the written field, as strings.
    ///
    /// `param` falls back to `shortName`; `levelist` is left out for
    /// surface fields.
    pub fn as_mars(&self) -> BTreeMap<String, String> {
        let surface = self.get("levtype").and_then(MetaValue::as_str) == Some("sfc");
        MARS_KEYS
            .iter()
            .filter(|key| !(surface && **key == "levelist"))
            .filter_map(|key| {
                let value = match *key {
                    "param" => self.get("param").or_else(|| self.get("shortName")),
                    _ => self.get(key),
                };
                value.map(|v| (key.to_string(), v.to_string()))
            })
            .collect()
    }
}

/// Result of a successful write.
#[derive(Debug, Clone)]
pub struct Written {
    pub handle: WrittenHandle,
    /// Where the field went, for outputs that write files.
    pub path: Option<PathBuf>,
}

/// Destination of model results.
pub trait FieldOutput: Send {
    /// Write one field. `values` replaces the template's values when
    /// given; `overrides` replace template metadata. Outputs that discard
    /// fields return `Ok(None)`.
    fn write(
        &mut self,
        values: Option<&[f64]>,
        template: &FieldRef,
        overrides: Overrides,
    ) -> Result<Option<Written>>;

    /// Flush and close everything written so far.
    fn finalise(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<O: FieldOutput + ?Sized> FieldOutput for Box<O> {
    fn write(
        &mut self,
        values: Option<&[f64]>,
        template: &FieldRef,
        overrides: Overrides,
    ) -> Result<Option<Written>> {
        (**self).write(values, template, overrides)
    }

    fn finalise(&mut self) -> Result<()> {
        (**self).finalise()
    }
}
