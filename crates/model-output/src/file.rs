//! Writes encoded fields to one or more files.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use forecast_common::{Field, FieldRef, ForecastError, MetaValue, Metadata, Result};
use tracing::{debug, info};

use crate::encode::FieldEncoder;
use crate::output::{FieldOutput, Overrides, Written, WrittenHandle};
use crate::path::PathTemplate;

pub const DEFAULT_EDITION: i64 = 2;

/// File output settings.
#[derive(Debug, Clone)]
pub struct FileOutputConfig {
    /// Output path; may contain `{key}` placeholders.
    pub path: String,
    /// Metadata set on every field. `stream`, `expver` and `class` get
    /// defaults when absent; `edition` is taken out and written as an
    /// encoding key.
    pub metadata: Metadata,
    pub expver: String,
    /// Model version, written as `generatingProcessIdentifier`.
    pub version: i64,
    /// Verify written keys on every field, not only when asked per write.
    pub check: bool,
}

impl FileOutputConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            metadata: Metadata::new(),
            expver: "0001".to_string(),
            version: 1,
            check: false,
        }
    }
}

pub struct FileOutput<E> {
    path: PathTemplate,
    encoder: E,
    /// Keys set on every field: encoding keys first, then metadata.
    keys: Metadata,
    check: bool,
    files: HashMap<PathBuf, BufWriter<File>>,
}

impl<E: FieldEncoder> FileOutput<E> {
    pub fn new(config: FileOutputConfig, encoder: E) -> Result<Self> {
        let path = PathTemplate::parse(&config.path)?;
        let mut metadata = config.metadata;
        metadata
            .entry("stream".to_string())
            .or_insert_with(|| "oper".into());
        metadata
            .entry("expver".to_string())
            .or_insert_with(|| config.expver.as_str().into());
        metadata
            .entry("class".to_string())
            .or_insert_with(|| "ml".into());

        let edition = metadata
            .remove("edition")
            .unwrap_or(MetaValue::Int(DEFAULT_EDITION));
        let mut keys = Metadata::new();
        keys.insert("edition".to_string(), edition);
        keys.insert(
            "generatingProcessIdentifier".to_string(),
            MetaValue::Int(config.version),
        );
        keys.extend(metadata);

        info!(path = %path.as_str(), "Writing results");
        Ok(Self {
            path,
            encoder,
            keys,
            check: config.check,
            files: HashMap::new(),
        })
    }

    /// Keys set on every written field.
    pub fn keys(&self) -> &Metadata {
        &self.keys
    }

    /// Files opened so far.
    pub fn paths(&self) -> Vec<&Path> {
        self.files.keys().map(PathBuf::as_path).collect()
    }

    fn file(&mut self, path: &Path) -> Result<&mut BufWriter<File>> {
        if !self.files.contains_key(path) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            debug!(path = %path.display(), "Opening output file");
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            self.files.insert(path.to_path_buf(), BufWriter::new(file));
        }
        self.files
            .get_mut(path)
            .ok_or_else(|| ForecastError::Integrity(format!("output file {} not open", path.display())))
    }
}

/// NaN and infinite values are never written.
fn ensure_finite(values: &[f64], template: &dyn Field) -> Result<()> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(ForecastError::NonFinite {
            kind: "NaN",
            field: template.describe(),
        });
    }
    if values.iter().any(|v| v.is_infinite()) {
        return Err(ForecastError::NonFinite {
            kind: "Infinite",
            field: template.describe(),
        });
    }
    Ok(())
}

/// Compare every requested key with what the encoder wrote. A textual
/// `param` is compared against `shortName`.
fn verify(requested: &Metadata, written: &Metadata, template: &dyn Field) -> Result<()> {
    for (key, expected) in requested {
        if key == "template" || expected.is_null() {
            continue;
        }
        let key = match (key.as_str(), expected) {
            ("param", MetaValue::Str(s)) if s.parse::<f64>().is_err() => "shortName",
            _ => key.as_str(),
        };
        let actual = written.get(key).map(|v| v.to_string());
        if actual.as_deref() != Some(expected.to_string().as_str()) {
            return Err(ForecastError::Integrity(format!(
                "{}: {} written as {} instead of {}",
                template.describe(),
                key,
                actual.unwrap_or_else(|| "nothing".to_string()),
                expected
            )));
        }
    }
    Ok(())
}

impl<E: FieldEncoder> FieldOutput for FileOutput<E> {
    fn write(
        &mut self,
        values: Option<&[f64]>,
        template: &FieldRef,
        overrides: Overrides,
    ) -> Result<Option<Written>> {
        if let Some(values) = values {
            ensure_finite(values, template.as_ref())?;
        }

        let mut keys = self.keys.clone();
        keys.extend(overrides.keys);
        let encoded = self.encoder.encode(values, template.as_ref(), &keys)?;

        if overrides.check.unwrap_or(self.check) {
            verify(&keys, &encoded.metadata, template.as_ref())?;
        }

        let path = self.path.render(&encoded.metadata)?;
        self.file(&path)?.write_all(&encoded.bytes)?;

        Ok(Some(Written {
            handle: WrittenHandle::new(encoded.metadata),
            path: Some(path),
        }))
    }

    fn finalise(&mut self) -> Result<()> {
        for (path, file) in self.files.iter_mut() {
            debug!(path = %path.display(), "Closing output file");
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::Encoded;
    use forecast_common::BaseField;

    /// Writes only the metadata, and drops `class`.
    struct Lossy;

    impl FieldEncoder for Lossy {
        fn encode(&self, _values: Option<&[f64]>, template: &dyn Field, keys: &Metadata) -> Result<Encoded> {
            let mut metadata = template.metadata_map();
            metadata.extend(keys.clone());
            metadata.remove("class");
            Ok(Encoded {
                bytes: b"x".to_vec(),
                metadata,
            })
        }
    }

    fn template() -> FieldRef {
        BaseField::new(vec![1.0, 2.0], Metadata::new())
            .with("param", "2t")
            .with("date", 20230101i64)
            .into_ref()
    }

    #[test]
    fn test_defaults_and_encoding_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FileOutputConfig::new(dir.path().join("out.grib").to_string_lossy());
        config.metadata.insert("edition".into(), 1i64.into());
        config.metadata.insert("class".into(), "od".into());
        config.version = 7;

        let out = FileOutput::new(config, Lossy).unwrap();
        let keys = out.keys();
        assert_eq!(keys.get("edition"), Some(&MetaValue::Int(1)));
        assert_eq!(keys.get("generatingProcessIdentifier"), Some(&MetaValue::Int(7)));
        assert_eq!(keys.get("stream"), Some(&"oper".into()));
        assert_eq!(keys.get("expver"), Some(&"0001".into()));
        assert_eq!(keys.get("class"), Some(&"od".into()));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileOutputConfig::new(dir.path().join("out.grib").to_string_lossy());
        let mut out = FileOutput::new(config, Lossy).unwrap();

        let err = out
            .write(Some(&[1.0, f64::NAN]), &template(), Overrides::new())
            .unwrap_err();
        assert!(err.to_string().starts_with("NaN values found in field Field(param=2t"));

        let err = out
            .write(Some(&[f64::INFINITY, 1.0]), &template(), Overrides::new())
            .unwrap_err();
        assert!(matches!(err, ForecastError::NonFinite { kind: "Infinite", .. }));
        assert!(out.paths().is_empty());
    }

    #[test]
    fn test_check_reports_dropped_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileOutputConfig::new(dir.path().join("out.grib").to_string_lossy());
        let mut out = FileOutput::new(config, Lossy).unwrap();

        assert!(out.write(None, &template(), Overrides::new()).is_ok());
        let err = out
            .write(None, &template(), Overrides::new().check(true))
            .unwrap_err();
        assert!(err.to_string().contains("class written as nothing instead of ml"));
    }

    #[test]
    fn test_textual_param_checked_against_short_name() {
        let requested: Metadata = [("param".to_string(), MetaValue::from("2t"))]
            .into_iter()
            .collect();
        let written: Metadata = [
            ("param".to_string(), MetaValue::from(167i64)),
            ("shortName".to_string(), MetaValue::from("2t")),
        ]
        .into_iter()
        .collect();
        assert!(verify(&requested, &written, template().as_ref()).is_ok());

        let numeric: Metadata = [("param".to_string(), MetaValue::from("167"))]
            .into_iter()
            .collect();
        assert!(verify(&numeric, &written, template().as_ref()).is_ok());
    }
}
