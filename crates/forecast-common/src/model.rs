//! What a model needs as input: parameters, levels, grid and area.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::request::RetrieveRequest;

/// Parameters on a set of levels (pressure or model levels).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamLevels {
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub levels: Vec<i64>,
}

impl ParamLevels {
    pub fn new(params: &[&str], levels: &[i64]) -> Self {
        Self {
            params: params.iter().map(|p| p.to_string()).collect(),
            levels: levels.to_vec(),
        }
    }

    /// Both parameters and levels are present.
    pub fn is_set(&self) -> bool {
        !self.params.is_empty() && !self.levels.is_empty()
    }
}

/// Input description of a model, as published by its checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub grid: Grid,
    /// North/West/South/East
    #[serde(default)]
    pub area: Option<Vec<f64>>,
    #[serde(default)]
    pub param_sfc: Vec<String>,
    #[serde(default)]
    pub param_level_pl: ParamLevels,
    #[serde(default)]
    pub param_level_ml: ParamLevels,
    /// Extra keys merged into retrieval requests.
    #[serde(default)]
    pub retrieve: RetrieveRequest,
    /// Lag offsets in hours; empty means a single date.
    #[serde(default)]
    pub lagged: Vec<i64>,
    /// Surface parameters that do not change in time.
    #[serde(default)]
    pub constant_fields: Vec<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            grid: Grid::Regular([0.25, 0.25]),
            area: None,
            param_sfc: Vec::new(),
            param_level_pl: ParamLevels::default(),
            param_level_ml: ParamLevels::default(),
            retrieve: RetrieveRequest::new(),
            lagged: Vec::new(),
            constant_fields: Vec::new(),
        }
    }
}
