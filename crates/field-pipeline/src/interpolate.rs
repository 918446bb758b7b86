//! Regridding stage and the grid template cache.
//!
//! The regridding algorithm sits behind [`Regridder`]; this crate ships a
//! bilinear implementation for global regular lat/lon grids. Output fields
//! carry the geometry metadata of the target grid, taken from a
//! [`GridTemplateCache`] that builds each template once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use forecast_common::grid::keys;
use forecast_common::{
    FieldRef, FieldSet, ForecastError, Grid, MetaValue, Metadata, RegularGeometry, Result,
};
use tracing::{debug, info, warn};

use crate::stage::Stage;
use crate::wrap::{MetadataOverride, ValueOverride};

/// Moves values from one grid to another.
pub trait Regridder: Send + Sync {
    fn regrid(&self, values: &[f64], source: &Grid, target: &Grid) -> Result<Vec<f64>>;

    /// Whether this regridder can go from `source` to `target`. Checked
    /// before anything is retrieved.
    fn supports(&self, _source: &Grid, _target: &Grid) -> bool {
        true
    }
}

/// Approximate point spacing of a grid in degrees.
///
/// Gaussian grids `N<n>` / `O<n>` have `n` latitudes between pole and
/// equator.
pub fn grid_spacing(grid: &Grid) -> Option<f64> {
    match grid {
        Grid::Regular([dx, dy]) => Some(dx.min(*dy)),
        Grid::Named(name) => gaussian_number(name).map(|(n, _)| 90.0 / n as f64),
    }
}

/// `(N, octahedral)` for `N320` / `O96` style names.
fn gaussian_number(name: &str) -> Option<(u32, bool)> {
    let mut chars = name.chars();
    let octahedral = match chars.next()? {
        'N' | 'n' => false,
        'O' | 'o' => true,
        _ => return None,
    };
    chars.as_str().parse().ok().map(|n| (n, octahedral))
}

fn regular_geometry(grid: &Grid) -> Result<RegularGeometry> {
    match grid {
        Grid::Regular([dx, dy]) if *dx > 0.0 && *dy > 0.0 => Ok(RegularGeometry::global(*dx, *dy)),
        other => Err(ForecastError::config(
            "grid",
            format!("bilinear regridding needs a regular lat/lon grid, got {}", other),
        )),
    }
}

/// Bilinear interpolation between global regular lat/lon grids.
///
/// Longitudes wrap around; latitudes clamp at the poles. Gaussian targets
/// such as `N320` or `O96` need a regridder injected with
/// [`crate::RequestBasedInput::with_regridder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BilinearRegridder;

impl Regridder for BilinearRegridder {
    fn supports(&self, source: &Grid, target: &Grid) -> bool {
        regular_geometry(source).is_ok() && regular_geometry(target).is_ok()
    }

    fn regrid(&self, values: &[f64], source: &Grid, target: &Grid) -> Result<Vec<f64>> {
        let src = regular_geometry(source)?;
        let dst = regular_geometry(target)?;

        if values.len() != src.len() {
            return Err(ForecastError::Integrity(format!(
                "cannot regrid {} values from grid {} ({} points)",
                values.len(),
                source,
                src.len()
            )));
        }

        let mut out = Vec::with_capacity(dst.len());
        for j in 0..dst.nj {
            let y = (src.lat_first - dst.latitude(j)) / src.dj;
            let y = y.clamp(0.0, (src.nj - 1) as f64);
            let y0 = y.floor() as usize;
            let y1 = (y0 + 1).min(src.nj - 1);
            let yf = y - y0 as f64;

            for i in 0..dst.ni {
                let x = (dst.longitude(i) - src.lon_first).rem_euclid(360.0) / src.di;
                let x0 = (x.floor() as usize) % src.ni;
                let x1 = (x0 + 1) % src.ni;
                let xf = x - x.floor();

                let v00 = values[y0 * src.ni + x0];
                let v10 = values[y0 * src.ni + x1];
                let v01 = values[y1 * src.ni + x0];
                let v11 = values[y1 * src.ni + x1];

                let top = v00 * (1.0 - xf) + v10 * xf;
                let bottom = v01 * (1.0 - xf) + v11 * xf;
                out.push(top * (1.0 - yf) + bottom * yf);
            }
        }
        Ok(out)
    }
}

/// Target-grid metadata templates, built lazily and kept for the life of
/// the cache.
#[derive(Debug, Default)]
pub struct GridTemplateCache {
    templates: Mutex<HashMap<String, Arc<Metadata>>>,
}

impl GridTemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Template for `grid`, building it on first use.
    pub fn get(&self, grid: &Grid) -> Result<Arc<Metadata>> {
        let mut templates = self
            .templates
            .lock()
            .map_err(|_| ForecastError::Integrity("grid template cache poisoned".to_string()))?;

        if let Some(template) = templates.get(&grid.key()) {
            return Ok(template.clone());
        }

        let template = Arc::new(Self::build(grid)?);
        debug!(grid = %grid, keys = template.len(), "Built grid template");
        templates.insert(grid.key(), template.clone());
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(grid: &Grid) -> Result<Metadata> {
        match grid {
            Grid::Regular(_) => Ok(regular_geometry(grid)?.to_metadata()),
            Grid::Named(name) => {
                let (n, octahedral) = gaussian_number(name).ok_or_else(|| {
                    ForecastError::config("grid", format!("unknown grid '{}'", name))
                })?;
                let mut md = Metadata::new();
                md.insert(keys::GRID_TYPE.into(), MetaValue::from("reduced_gg"));
                md.insert("N".into(), MetaValue::from(n));
                md.insert("isOctahedral".into(), MetaValue::from(octahedral as i64));
                md.insert(keys::LAT_FIRST.into(), MetaValue::Float(90.0 - 45.0 / n as f64));
                md.insert(keys::LON_FIRST.into(), MetaValue::Float(0.0));
                Ok(md)
            }
        }
    }
}

/// Regrids every field from `source` to `target`.
pub struct Interpolate {
    source: Grid,
    target: Grid,
    regridder: Arc<dyn Regridder>,
    templates: Arc<GridTemplateCache>,
    metadata: Metadata,
}

impl Interpolate {
    pub fn new(
        source: Grid,
        target: Grid,
        regridder: Arc<dyn Regridder>,
        templates: Arc<GridTemplateCache>,
    ) -> Self {
        let stage = Self {
            source,
            target,
            regridder,
            templates,
            metadata: Metadata::new(),
        };
        info!(source = %stage.source, target = %stage.target, "Interpolating input data");
        if stage.oversampling() {
            warn!(
                source = %stage.source,
                target = %stage.target,
                "This will oversample the input data"
            );
        }
        stage
    }

    /// Extra metadata stamped on every output field.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the target grid is finer than the source grid.
    pub fn oversampling(&self) -> bool {
        match (grid_spacing(&self.source), grid_spacing(&self.target)) {
            (Some(src), Some(dst)) => dst + 1e-9 < src,
            _ => false,
        }
    }

    fn target_shape(&self, len: usize) -> Vec<usize> {
        match regular_geometry(&self.target) {
            Ok(g) if g.len() == len => vec![g.nj, g.ni],
            _ => vec![len],
        }
    }
}

impl Stage for Interpolate {
    fn name(&self) -> &str {
        "interpolate"
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        let template = self.templates.get(&self.target)?;
        let mut patch = (*template).clone();
        patch.extend(self.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut out = FieldSet::empty();
        for field in fields {
            let values = self.regridder.regrid(field.values(), &self.source, &self.target)?;
            let shape = self.target_shape(values.len());
            let data: FieldRef = Arc::new(ValueOverride::new(field, values).with_shape(shape));
            out.push(Arc::new(MetadataOverride::new(data, patch.clone())));
        }
        Ok(out)
    }
}
