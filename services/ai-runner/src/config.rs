//! Model configuration, loaded from YAML.

use std::path::Path;

use anyhow::{bail, Context, Result};
use forecast_common::{Grid, Metadata, ModelSpec, ParamLevels, RetrieveRequest};
use mars_requests::SharedKeys;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Everything the runner needs to know about a model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(flatten)]
    pub spec: ModelSpec,
    #[serde(default = "default_expver")]
    pub expver: String,
    #[serde(default = "default_version")]
    pub version: i64,
    /// Metadata added to every written field.
    #[serde(default)]
    pub grib_extra_metadata: Metadata,
    /// Keys written on the first retrieval request only; all shared keys
    /// when absent.
    #[serde(default)]
    pub shared_keys: Option<Vec<String>>,
    /// The remote server adjusts retrieval requests for this model.
    #[serde(default)]
    pub remote_has_patch: bool,
    /// Accumulated parameters, written as zero fields at step 0.
    #[serde(default)]
    pub accumulations: Vec<String>,
}

fn default_expver() -> String {
    "0001".to_string()
}

fn default_version() -> i64 {
    1
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            spec: ModelSpec::default(),
            expver: default_expver(),
            version: default_version(),
            grib_extra_metadata: Metadata::new(),
            shared_keys: None,
            remote_has_patch: false,
            accumulations: Vec::new(),
        }
    }
}

/// Parameters asked from the remote metadata endpoint.
pub const REMOTE_PARAMETERS: &[&str] = &[
    "expver",
    "version",
    "grid",
    "area",
    "param_level_ml",
    "param_level_pl",
    "param_sfc",
    "lagged",
    "grib_extra_metadata",
    "retrieve",
    "remote_has_patch",
];

impl ModelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ModelConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded model config");
        Ok(config)
    }

    pub fn shared_keys(&self) -> SharedKeys {
        match &self.shared_keys {
            Some(keys) => SharedKeys::Only(keys.clone()),
            None => SharedKeys::All,
        }
    }

    /// Fill in parameters published by a remote server. Null values are
    /// skipped. Level parameters may come as `{params, levels}` or as a
    /// `[params, levels]` pair.
    pub fn apply_remote(&mut self, params: &Map<String, Value>) -> Result<()> {
        for (key, value) in params.iter().filter(|(_, v)| !v.is_null()) {
            let value = value.clone();
            let spec = &mut self.spec;
            match key.as_str() {
                "expver" => {
                    self.expver = match value {
                        Value::String(s) => s,
                        other => other.to_string(),
                    }
                }
                "version" => self.version = serde_json::from_value(value)?,
                "grid" => spec.grid = serde_json::from_value::<Grid>(value)?,
                "area" => spec.area = serde_json::from_value(value)?,
                "param_sfc" => spec.param_sfc = serde_json::from_value(value)?,
                "param_level_pl" => spec.param_level_pl = param_levels(value)?,
                "param_level_ml" => spec.param_level_ml = param_levels(value)?,
                // `false` stands for "not lagged".
                "lagged" => spec.lagged = serde_json::from_value(value).unwrap_or_default(),
                "grib_extra_metadata" => self.grib_extra_metadata = serde_json::from_value(value)?,
                "retrieve" => spec.retrieve = serde_json::from_value::<RetrieveRequest>(value)?,
                "remote_has_patch" => self.remote_has_patch = value.as_bool().unwrap_or(false),
                other => debug!(key = other, "Ignoring remote parameter"),
            }
        }
        Ok(())
    }
}

fn param_levels(value: Value) -> Result<ParamLevels> {
    match value {
        Value::Array(pair) if pair.len() == 2 => {
            let mut pair = pair.into_iter();
            let params = pair.next().unwrap_or(Value::Null);
            let levels = pair.next().unwrap_or(Value::Null);
            Ok(ParamLevels {
                params: serde_json::from_value(params)?,
                levels: serde_json::from_value(levels)?,
            })
        }
        Value::Object(_) => Ok(serde_json::from_value(value)?),
        other => bail!("cannot read levels from {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_model_config() {
        let yaml = r#"
grid: [0.25, 0.25]
area: [90, 0, -90, 359.75]
param_sfc: [2t, msl, z, lsm]
param_level_pl:
  params: [t, z, u, v]
  levels: [1000, 850, 500]
lagged: [-6, 0]
constant_fields: [z, lsm]
retrieve:
  class: od
expver: abcd
grib_extra_metadata:
  type: fc
shared_keys: [target]
accumulations: [tp]
"#;

        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.spec.grid, Grid::Regular([0.25, 0.25]));
        assert_eq!(config.spec.param_level_pl.levels, vec![1000, 850, 500]);
        assert_eq!(config.spec.lagged, vec![-6, 0]);
        assert_eq!(config.spec.retrieve.strings("class"), vec!["od"]);
        assert_eq!(config.expver, "abcd");
        assert_eq!(config.version, 1);
        assert_eq!(config.shared_keys(), SharedKeys::Only(vec!["target".into()]));
        assert_eq!(config.accumulations, vec!["tp"]);
    }

    #[test]
    fn test_apply_remote_parameters() {
        let mut config = ModelConfig::default();
        let params = json!({
            "grid": "O96",
            "param_level_pl": [["t", "z"], [500, 850]],
            "lagged": false,
            "version": 3,
            "expver": null,
            "remote_has_patch": true,
        });

        config.apply_remote(params.as_object().unwrap()).unwrap();
        assert_eq!(config.spec.grid, Grid::Named("O96".into()));
        assert_eq!(config.spec.param_level_pl, ParamLevels::new(&["t", "z"], &[500, 850]));
        assert!(config.spec.lagged.is_empty());
        assert_eq!(config.version, 3);
        assert_eq!(config.expver, "0001");
        assert!(config.remote_has_patch);
    }
}
