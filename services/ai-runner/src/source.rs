//! Fields read from local JSON-lines files, as written by
//! [`model_output::JsonLinesEncoder`].

use std::path::{Path, PathBuf};

use field_pipeline::{FieldDecoder, FieldSource};
use forecast_common::{
    BaseField, FieldSet, ForecastError, MetaValue, Metadata, Result, RetrieveRequest,
};
use serde::Deserialize;
use tracing::{debug, info};

/// Request keys a file source selects on.
const SELECT_KEYS: &[&str] = &["param", "levtype", "levelist", "date", "time"];

#[derive(Deserialize)]
struct Line {
    metadata: Metadata,
    #[serde(default)]
    shape: Option<Vec<usize>>,
    values: Vec<f64>,
}

/// Decodes one field per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl FieldDecoder for JsonLinesDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<FieldSet> {
        let text = String::from_utf8_lossy(bytes);
        let mut fields = FieldSet::empty();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line: Line = serde_json::from_str(line).map_err(|e| {
                ForecastError::Integrity(format!("line {}: {}", number + 1, e))
            })?;
            let mut field = BaseField::new(line.values, line.metadata);
            if let Some(shape) = line.shape {
                field = field.with_shape(shape);
            }
            fields.push(field.into_ref());
        }
        Ok(fields)
    }
}

/// Field source backed by one file.
pub struct FileSource {
    path: PathBuf,
    name: String,
    fields: FieldSet,
}

impl FileSource {
    pub fn open(path: &Path, decoder: &dyn FieldDecoder) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let fields = decoder.decode(&bytes)?;
        info!(path = %path.display(), count = fields.len(), "Loaded input fields");
        Ok(Self {
            path: path.to_path_buf(),
            name: format!("file {}", path.display()),
            fields,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

impl FieldSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    /// Fields whose selection keys match the request, in file order.
    fn retrieve(&self, request: &RetrieveRequest) -> Result<FieldSet> {
        let mut fields = self.fields.clone();
        for key in SELECT_KEYS {
            if let Some(value) = request.get(key) {
                let values: Vec<MetaValue> = value.items();
                fields = fields.sel(key, &values);
            }
        }
        debug!(request = %request, count = fields.len(), "Selected fields");
        Ok(fields)
    }
}
