//! Time-invariant surface fields substituted from a static dataset.
//!
//! Some sources do not publish constant fields such as orography. Those
//! are taken from a reference file per resolution and re-tagged with the
//! request's date, time and step so they look like ordinary retrievals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use forecast_common::time::{hhmm, valid_datetime};
use forecast_common::{FieldRef, FieldSet, ForecastError, MetaValue, Metadata, Result};
use tracing::{debug, info, warn};

use crate::wrap::MetadataOverride;

/// Surface parameters served from the constants dataset.
pub const CONSTANT_PARAMS: &[&str] = &["z", "sdor", "slor"];

/// Where the constants file for a resolution is published.
pub const CONSTANTS_URL: &str =
    "https://get.ecmwf.int/repository/test-data/ai-models/opendata/constants-{resol}.grib2";

pub fn constants_url(resol: &str) -> String {
    CONSTANTS_URL.replace("{resol}", resol)
}

/// `<cache_dir>/constants-<resol>.grib2`
pub fn constants_path(cache_dir: &Path, resol: &str) -> PathBuf {
    cache_dir.join(format!("constants-{}.grib2", resol))
}

/// `$HOME/.cache/ai-models`
pub fn default_cache_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .ok_or_else(|| ForecastError::config("HOME", "not set; cannot locate the cache directory"))?;
    Ok(PathBuf::from(home).join(".cache").join("ai-models"))
}

/// Whether `param` is one of [`CONSTANT_PARAMS`].
pub fn is_constant(param: &str) -> bool {
    CONSTANT_PARAMS.contains(&param)
}

/// Split requested surface parameters into (retrievable, constant).
pub fn split_constants(params: &[String]) -> (Vec<String>, Vec<String>) {
    params.iter().cloned().partition(|p| !is_constant(p))
}

/// Source of constant fields, keyed by resolution (`0p25`, ...).
pub trait ConstantsStore: Send + Sync {
    /// All constant fields available at `resol`.
    fn load(&self, resol: &str) -> Result<FieldSet>;
}

/// Constants held in memory.
#[derive(Debug, Default)]
pub struct MemoryConstantsStore {
    by_resol: HashMap<String, FieldSet>,
}

impl MemoryConstantsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resol: &str, fields: FieldSet) -> Self {
        self.by_resol.insert(resol.to_string(), fields);
        self
    }
}

impl ConstantsStore for MemoryConstantsStore {
    fn load(&self, resol: &str) -> Result<FieldSet> {
        self.by_resol.get(resol).cloned().ok_or_else(|| {
            ForecastError::MissingParameter(format!("no constants for resolution {}", resol))
        })
    }
}

/// Turns the bytes of a constants file into fields.
pub trait FieldDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<FieldSet>;
}

/// Constants read from the local cache directory.
///
/// The file must already be present at [`constants_path`]; the error
/// names the URL it is published at.
pub struct FileConstantsStore {
    cache_dir: PathBuf,
    decoder: Arc<dyn FieldDecoder>,
}

impl FileConstantsStore {
    pub fn new(cache_dir: impl Into<PathBuf>, decoder: Arc<dyn FieldDecoder>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            decoder,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl ConstantsStore for FileConstantsStore {
    fn load(&self, resol: &str) -> Result<FieldSet> {
        let path = constants_path(&self.cache_dir, resol);
        if !path.exists() {
            return Err(ForecastError::config(
                "constants",
                format!(
                    "{} not found, download it from {}",
                    path.display(),
                    constants_url(resol)
                ),
            ));
        }
        info!(path = %path.display(), "Loading constants");
        let bytes = std::fs::read(&path)?;
        self.decoder.decode(&bytes)
    }
}

/// Load `params` from `store` and re-tag them as if retrieved for
/// `date`/`time`/`step`.
///
/// `time` may be given as hours (`12`) or `HHMM` (`1200`); fields carry
/// it as an integer `HHMM`, so 06:00 is `600`.
pub fn substitute_constants(
    store: &dyn ConstantsStore,
    resol: &str,
    params: &[String],
    date: i64,
    time: i64,
    step: i64,
) -> Result<FieldSet> {
    if params.is_empty() {
        return Ok(FieldSet::empty());
    }

    match params {
        [single] => warn!(
            param = %single,
            "Single level parameter '{}' is not available from the source, using constants-{}.grib2 instead",
            single,
            resol
        ),
        many => warn!(
            params = ?many,
            "Single level parameters {:?} are not available from the source, using constants-{}.grib2 instead",
            many,
            resol
        ),
    }

    let time = hhmm(time)?;
    let valid = valid_datetime(date, time, step)?;

    let mut patch = Metadata::new();
    patch.insert(
        "valid_datetime".into(),
        MetaValue::from(valid.format("%Y-%m-%d %H:%M:%S").to_string()),
    );
    patch.insert("date".into(), MetaValue::Int(date));
    patch.insert("time".into(), MetaValue::Int(time));
    patch.insert("step".into(), MetaValue::Int(step));

    let wanted: Vec<MetaValue> = params.iter().map(|p| MetaValue::from(p.as_str())).collect();
    let fields = store.load(resol)?.sel("param", &wanted);
    debug!(count = fields.len(), resol, "Substituted constant fields");

    Ok(fields
        .into_iter()
        .map(|f| Arc::new(MetadataOverride::new(f, patch.clone())) as FieldRef)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::BaseField;

    fn store() -> MemoryConstantsStore {
        let fields: FieldSet = ["z", "sdor", "slor"]
            .iter()
            .map(|p| {
                BaseField::new(vec![1.0], Metadata::new())
                    .with("param", *p)
                    .with("date", 20000101i64)
                    .with("time", 0i64)
                    .into_ref()
            })
            .collect();
        MemoryConstantsStore::new().with("0p25", fields)
    }

    #[test]
    fn test_split_constants() {
        let params: Vec<String> = ["2t", "z", "msl", "sdor"].iter().map(|s| s.to_string()).collect();
        let (retrieve, constant) = split_constants(&params);
        assert_eq!(retrieve, vec!["2t", "msl"]);
        assert_eq!(constant, vec!["z", "sdor"]);
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            constants_url("0p25"),
            "https://get.ecmwf.int/repository/test-data/ai-models/opendata/constants-0p25.grib2"
        );
        assert_eq!(
            constants_path(Path::new("/tmp/cache"), "0p25"),
            PathBuf::from("/tmp/cache/constants-0p25.grib2")
        );
    }

    #[test]
    fn test_substitute_retags() {
        let params = vec!["z".to_string()];
        let out = substitute_constants(&store(), "0p25", &params, 20230101, 18, 6).unwrap();

        assert_eq!(out.len(), 1);
        let f = out.get(0).unwrap();
        assert_eq!(f.metadata("param"), Some(MetaValue::from("z")));
        assert_eq!(f.metadata("date"), Some(MetaValue::Int(20230101)));
        assert_eq!(f.metadata("time"), Some(MetaValue::Int(1800)));
        assert_eq!(f.metadata("step"), Some(MetaValue::Int(6)));
        assert_eq!(
            f.metadata("valid_datetime"),
            Some(MetaValue::from("2023-01-02 00:00:00"))
        );
    }

    #[test]
    fn test_substituted_time_is_integer_hhmm() {
        let params = vec!["sdor".to_string()];
        let out = substitute_constants(&store(), "0p25", &params, 20230101, 6, 0).unwrap();

        let f = out.get(0).unwrap();
        assert_eq!(f.metadata("time"), Some(MetaValue::Int(600)));
        assert_eq!(
            f.metadata("valid_datetime"),
            Some(MetaValue::from("2023-01-01 06:00:00"))
        );
    }

    #[test]
    fn test_unknown_resolution() {
        let params = vec!["z".to_string()];
        let err = substitute_constants(&store(), "0p1", &params, 20230101, 0, 0).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_file_store_missing_file_names_url() {
        struct Never;
        impl FieldDecoder for Never {
            fn decode(&self, _bytes: &[u8]) -> Result<FieldSet> {
                Ok(FieldSet::empty())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store = FileConstantsStore::new(dir.path(), Arc::new(Never));
        let err = store.load("0p25").unwrap_err();
        assert!(err.to_string().contains("constants-0p25.grib2"));
        assert!(err.to_string().contains("https://get.ecmwf.int"));
    }
}
