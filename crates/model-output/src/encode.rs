//! Field encoding.
//!
//! The binary format of written fields is delegated to a [`FieldEncoder`].
//! The encoder also reports the metadata of the message it produced,
//! which is what integrity checks and archive bookkeeping look at.

use forecast_common::{Field, MetaValue, Metadata, Result};
use serde::Serialize;

/// One encoded message.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Metadata of the message as encoded.
    pub metadata: Metadata,
}

pub trait FieldEncoder: Send + Sync {
    /// Encode `values` (or the template's own values) with the template's
    /// metadata updated by `keys`.
    fn encode(&self, values: Option<&[f64]>, template: &dyn Field, keys: &Metadata) -> Result<Encoded>;
}

/// Encodes each field as one line of JSON.
///
/// A string `param` also sets `shortName`, the way a parameter given by
/// name is stored. The `template` key is never copied into the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesEncoder;

#[derive(Serialize)]
struct Line<'a> {
    metadata: &'a Metadata,
    shape: Vec<usize>,
    values: &'a [f64],
}

impl FieldEncoder for JsonLinesEncoder {
    fn encode(&self, values: Option<&[f64]>, template: &dyn Field, keys: &Metadata) -> Result<Encoded> {
        let mut metadata = template.metadata_map();
        for (key, value) in keys {
            if key == "template" {
                continue;
            }
            if value.is_null() {
                metadata.remove(key);
            } else {
                metadata.insert(key.clone(), value.clone());
            }
        }
        if let Some(MetaValue::Str(name)) = keys.get("param") {
            metadata.insert("shortName".to_string(), MetaValue::Str(name.clone()));
        }

        let (values, shape) = match values {
            Some(v) if v.len() == template.values().len() => (v, template.shape()),
            Some(v) => (v, vec![v.len()]),
            None => (template.values(), template.shape()),
        };

        let mut bytes = serde_json::to_vec(&Line {
            metadata: &metadata,
            shape,
            values,
        })?;
        bytes.push(b'\n');
        Ok(Encoded { bytes, metadata })
    }
}
