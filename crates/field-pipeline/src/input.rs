//! Request-based model input.
//!
//! Builds one retrieval request per (date, time) and level type, hands it
//! to a [`FieldSource`], and runs the result through the transformation
//! stages the source needs:
//!
//! ```text
//! FieldSource::retrieve(request)
//!      │
//!      ├─► Recenter        (antimeridian-centred grids only)
//!      ├─► UnitConversion  (pressure-level gh -> z, when z was asked for)
//!      ├─► Interpolate     (when the model grid is not published)
//!      └─► Relabel         (surface: hide levelist)
//!      │
//!      ▼
//! check_combinations(request)
//! ```

use std::sync::{Arc, OnceLock};

use forecast_common::{
    FieldSet, ForecastError, Grid, ModelSpec, NoPatch, RequestPatch, Result, RetrieveRequest,
    RunDateTime,
};
use tracing::{debug, info, warn};

use crate::check::check_combinations;
use crate::compute::UnitConversion;
use crate::constants::{split_constants, substitute_constants, ConstantsStore, MemoryConstantsStore};
use crate::interpolate::{BilinearRegridder, GridTemplateCache, Interpolate, Regridder};
use crate::recenter::Recenter;
use crate::relabel::Relabel;
use crate::stage::{Pipeline, Stage};

/// Returns the fields matching a retrieval request, in store order.
pub trait FieldSource: Send + Sync {
    /// Name used in log and error messages.
    fn name(&self) -> &str;

    fn retrieve(&self, request: &RetrieveRequest) -> Result<FieldSet>;
}

/// How a model grid is obtained from the published resolutions.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Published resolution tag (`0p25`).
    pub resol: &'static str,
    /// Grid the data is published on.
    pub source: Grid,
    /// Whether the data must be regridded to the model grid.
    pub interpolate: bool,
}

/// Map a model grid onto the open-data resolutions.
pub fn opendata_resolution(grid: &Grid) -> Result<Resolution> {
    let quarter = Grid::Regular([0.25, 0.25]);
    let via_quarter = |interpolate| Resolution {
        resol: "0p25",
        source: quarter.clone(),
        interpolate,
    };

    match grid {
        Grid::Regular([dx, dy]) if *dx == 0.25 && *dy == 0.25 => Ok(via_quarter(false)),
        Grid::Regular([dx, dy]) if *dx == 0.1 && *dy == 0.1 => Ok(via_quarter(true)),
        Grid::Named(name) if name == "N320" || name == "O96" => Ok(via_quarter(true)),
        other => Err(ForecastError::config(
            "grid",
            format!("grid {} is not available from open data", other),
        )),
    }
}

/// Model input assembled from per-date retrieval requests.
///
/// Each field set is retrieved once and then kept.
pub struct RequestBasedInput {
    source: Arc<dyn FieldSource>,
    spec: ModelSpec,
    dates: Vec<RunDateTime>,
    constants: Arc<dyn ConstantsStore>,
    regridder: Arc<dyn Regridder>,
    templates: Arc<GridTemplateCache>,
    recenter: Arc<Recenter>,
    patch: Arc<dyn RequestPatch>,
    sfc: OnceLock<FieldSet>,
    pl: OnceLock<FieldSet>,
    ml: OnceLock<FieldSet>,
}

impl RequestBasedInput {
    pub fn new(source: Arc<dyn FieldSource>, spec: ModelSpec, dates: Vec<RunDateTime>) -> Self {
        Self {
            source,
            spec,
            dates,
            constants: Arc::new(MemoryConstantsStore::new()),
            regridder: Arc::new(BilinearRegridder),
            templates: Arc::new(GridTemplateCache::new()),
            recenter: Arc::new(Recenter::new()),
            patch: Arc::new(NoPatch),
            sfc: OnceLock::new(),
            pl: OnceLock::new(),
            ml: OnceLock::new(),
        }
    }

    pub fn with_constants(mut self, constants: Arc<dyn ConstantsStore>) -> Self {
        self.constants = constants;
        self
    }

    pub fn with_regridder(mut self, regridder: Arc<dyn Regridder>) -> Self {
        self.regridder = regridder;
        self
    }

    /// Share a template cache with other inputs.
    pub fn with_templates(mut self, templates: Arc<GridTemplateCache>) -> Self {
        self.templates = templates;
        self
    }

    /// Hook applied to every request before it is adjusted for the source.
    pub fn with_patch(mut self, patch: Arc<dyn RequestPatch>) -> Self {
        self.patch = patch;
        self
    }

    pub fn templates(&self) -> &Arc<GridTemplateCache> {
        &self.templates
    }

    pub fn fields_sfc(&self) -> Result<FieldSet> {
        cached(&self.sfc, || {
            let params = &self.spec.param_sfc;
            if params.is_empty() {
                return Ok(FieldSet::empty());
            }
            info!(source = self.source.name(), "Loading surface fields");
            self.load_all(|dt| self.load_sfc(self.request(dt, params, None)))
        })
    }

    pub fn fields_pl(&self) -> Result<FieldSet> {
        cached(&self.pl, || {
            let pl = &self.spec.param_level_pl;
            if !pl.is_set() {
                return Ok(FieldSet::empty());
            }
            info!(source = self.source.name(), "Loading pressure fields");
            self.load_all(|dt| {
                self.load_pl(self.request(dt, &pl.params, Some(pl.levels.as_slice())))
            })
        })
    }

    pub fn fields_ml(&self) -> Result<FieldSet> {
        cached(&self.ml, || {
            let ml = &self.spec.param_level_ml;
            if !ml.is_set() {
                return Ok(FieldSet::empty());
            }
            info!(source = self.source.name(), "Loading model fields");
            self.load_all(|dt| {
                self.load_ml(self.request(dt, &ml.params, Some(ml.levels.as_slice())))
            })
        })
    }

    /// Surface, then pressure-level, then model-level fields.
    pub fn all_fields(&self) -> Result<FieldSet> {
        Ok(self
            .fields_sfc()?
            .concat(self.fields_pl()?)
            .concat(self.fields_ml()?))
    }

    fn load_all<F>(&self, mut load: F) -> Result<FieldSet>
    where
        F: FnMut(RunDateTime) -> Result<FieldSet>,
    {
        let mut fields = FieldSet::empty();
        for dt in &self.dates {
            fields.extend(load(*dt)?);
        }
        Ok(fields)
    }

    /// Every request the input will retrieve with, before the patch hook
    /// runs: surface, pressure-level, then model-level per date.
    pub fn requests(&self) -> Vec<RetrieveRequest> {
        let spec = &self.spec;
        let mut requests = Vec::new();
        for dt in &self.dates {
            if !spec.param_sfc.is_empty() {
                requests.push(self.unpatched(*dt, &spec.param_sfc, None));
            }
            for levels in [&spec.param_level_pl, &spec.param_level_ml] {
                if levels.is_set() {
                    requests.push(self.unpatched(*dt, &levels.params, Some(levels.levels.as_slice())));
                }
            }
        }
        requests
    }

    fn request(&self, dt: RunDateTime, params: &[String], levels: Option<&[i64]>) -> RetrieveRequest {
        let mut request = self.unpatched(dt, params, levels);
        self.patch.patch(&mut request);
        request
    }

    fn unpatched(&self, dt: RunDateTime, params: &[String], levels: Option<&[i64]>) -> RetrieveRequest {
        let mut request = RetrieveRequest::new()
            .with("date", dt.date)
            .with("time", dt.time)
            .with("param", params.to_vec());
        if let Some(levels) = levels {
            request.insert("level", levels.to_vec());
        }
        request.insert("grid", self.spec.grid.to_request_value());
        if let Some(area) = &self.spec.area {
            request.insert("area", area.clone());
        }
        request.merge(&self.spec.retrieve);
        request
    }

    /// Rename `level`, drop `area`, and swap `grid` for a published
    /// resolution. Returns the regridding stage when one is needed.
    fn adjust(&self, mut request: RetrieveRequest) -> Result<(RetrieveRequest, Option<Interpolate>)> {
        if let Some(level) = request.remove("level") {
            request.insert("levelist", level);
        }
        request.remove("area");

        let grid = request
            .remove("grid")
            .ok_or_else(|| ForecastError::MissingParameter("grid".to_string()))?;
        let grid = Grid::from_request_value(&grid)?;
        let resolution = opendata_resolution(&grid)?;
        if resolution.interpolate && !self.regridder.supports(&resolution.source, &grid) {
            return Err(ForecastError::config(
                "grid",
                format!(
                    "grid {} is interpolated from {}, which needs a regridder for that grid",
                    grid, resolution.source
                ),
            ));
        }
        request.insert("resol", resolution.resol);

        let interpolate = resolution.interpolate.then(|| {
            Interpolate::new(
                resolution.source.clone(),
                grid,
                self.regridder.clone(),
                self.templates.clone(),
            )
        });
        Ok((request, interpolate))
    }

    fn load_pl(&self, request: RetrieveRequest) -> Result<FieldSet> {
        let (mut request, interpolate) = self.adjust(request)?;
        request.insert("levtype", "pl");
        let expected = request.clone();

        let mut params = lowercase(&request.strings("param"));
        let mut convert = None;
        if params.iter().any(|p| p == "z") {
            warn!(
                source = self.source.name(),
                "Parameter 'z' on pressure levels is not available, using 'gh' instead"
            );
            params.retain(|p| p != "z");
            if !params.iter().any(|p| p == "gh") {
                params.push("gh".to_string());
            }
            convert = Some(UnitConversion::geopotential_from_height());
        }
        request.insert("param", params);

        debug!(request = %request, "Retrieving pressure-level fields");
        let fields = self.source.retrieve(&request)?;
        let fields = Pipeline::new()
            .then(self.recenter.clone())
            .then_some(convert)
            .then_some(interpolate)
            .apply(fields)?;

        check_combinations(&fields, &expected, "PL", &["param", "levelist"])?;
        Ok(fields)
    }

    fn load_sfc(&self, request: RetrieveRequest) -> Result<FieldSet> {
        let (mut request, interpolate) = self.adjust(request)?;
        request.insert("levtype", "sfc");
        let expected = request.clone();

        let int = |key: &str| request.scalar(key).and_then(|v| v.as_i64());
        let date = int("date").ok_or_else(|| ForecastError::MissingParameter("date".into()))?;
        let time = int("time").ok_or_else(|| ForecastError::MissingParameter("time".into()))?;
        let step = int("step").unwrap_or(0);

        let (params, constant_params) = split_constants(&lowercase(&request.strings("param")));
        let resol = request
            .scalar("resol")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let constants =
            substitute_constants(self.constants.as_ref(), &resol, &constant_params, date, time, step)?;

        let retrieved = if params.is_empty() {
            FieldSet::empty()
        } else {
            request.insert("param", params);
            debug!(request = %request, "Retrieving surface fields");
            self.source.retrieve(&request)?
        };

        let fields = Pipeline::new()
            .then(self.recenter.clone())
            .then_some(interpolate)
            .then(Relabel::default().clear("levelist"))
            .apply(retrieved.concat(constants))?;

        check_combinations(&fields, &expected, "SFC", &["param"])?;
        Ok(fields)
    }

    fn load_ml(&self, request: RetrieveRequest) -> Result<FieldSet> {
        let (mut request, interpolate) = self.adjust(request)?;
        request.insert("levtype", "ml");

        debug!(request = %request, "Retrieving model-level fields");
        let fields = self.source.retrieve(&request)?;
        let fields = Pipeline::new()
            .then(self.recenter.clone())
            .then_some(interpolate)
            .apply(fields)?;

        check_combinations(&fields, &request, "ML", &["param", "levelist"])?;
        Ok(fields)
    }
}

fn lowercase(params: &[String]) -> Vec<String> {
    params.iter().map(|p| p.to_lowercase()).collect()
}

fn cached<F>(cell: &OnceLock<FieldSet>, load: F) -> Result<FieldSet>
where
    F: FnOnce() -> Result<FieldSet>,
{
    if let Some(fields) = cell.get() {
        return Ok(fields.clone());
    }
    let fields = load()?;
    Ok(cell.get_or_init(|| fields).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_table() {
        let r = opendata_resolution(&Grid::Regular([0.25, 0.25])).unwrap();
        assert_eq!(r.resol, "0p25");
        assert!(!r.interpolate);

        for grid in [
            Grid::Named("N320".into()),
            Grid::Named("O96".into()),
            Grid::Regular([0.1, 0.1]),
        ] {
            let r = opendata_resolution(&grid).unwrap();
            assert_eq!(r.source, Grid::Regular([0.25, 0.25]));
            assert!(r.interpolate);
        }

        assert!(opendata_resolution(&Grid::Regular([1.0, 1.0])).is_err());
    }
}
