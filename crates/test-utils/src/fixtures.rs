//! Common test fixtures for forecast runner tests.
//!
//! This module provides pre-built fields and grids that represent common
//! scenarios: pressure-level and surface fields, open-data style grids
//! centred on the antimeridian, and hindcast templates.

use forecast_common::{BaseField, FieldRef, FieldSet, MetaValue, Metadata, RegularGeometry};

/// Default analysis date used by fixtures.
pub const DATE: i64 = 20230101;

/// Default analysis time used by fixtures.
pub const TIME: i64 = 1200;

/// A field with `param`, `levtype`, optional `levelist`, and the fixture
/// date/time.
pub fn field(param: &str, levtype: &str, level: Option<i64>, values: Vec<f64>) -> FieldRef {
    let mut f = BaseField::new(values, Metadata::new())
        .with("param", param)
        .with("shortName", param)
        .with("levtype", levtype)
        .with("date", DATE)
        .with("time", TIME)
        .with("step", 0i64);
    if let Some(level) = level {
        f = f.with("levelist", level);
    }
    f.into_ref()
}

/// A pressure-level field.
pub fn pl_field(param: &str, level: i64, values: Vec<f64>) -> FieldRef {
    field(param, "pl", Some(level), values)
}

/// A surface field.
pub fn sfc_field(param: &str, values: Vec<f64>) -> FieldRef {
    field(param, "sfc", None, values)
}

/// Pressure-level fields for every (param, level) combination.
pub fn pl_fields(params: &[&str], levels: &[i64]) -> FieldSet {
    params
        .iter()
        .flat_map(|p| levels.iter().map(move |l| pl_field(p, *l, vec![*l as f64])))
        .collect()
}

/// A field laid out on `geometry`, with extra metadata.
pub fn grid_field(param: &str, geometry: &RegularGeometry, values: Vec<f64>) -> FieldRef {
    let mut md = geometry.to_metadata();
    md.insert(
        "scanningMode".to_string(),
        MetaValue::Int(geometry.scanning_mode),
    );
    BaseField::new(values, md)
        .with_shape(vec![geometry.nj, geometry.ni])
        .with("param", param)
        .with("levtype", "sfc")
        .with("date", DATE)
        .with("time", TIME)
        .with("step", 0i64)
        .into_ref()
}

/// Global grid whose first longitude is 180E (open-data convention).
pub fn antimeridian_geometry(step: f64) -> RegularGeometry {
    let mut g = RegularGeometry::global(step, step);
    g.lon_first = 180.0;
    g.lon_last = 180.0 - step;
    g
}

/// A field template that came from a hindcast source.
pub fn hindcast_template(date: i64, hdate: i64) -> FieldRef {
    BaseField::new(vec![0.0], Metadata::new())
        .with("param", "2t")
        .with("date", date)
        .with("hdate", hdate)
        .with("time", TIME)
        .into_ref()
}

/// A field template without `hdate`.
pub fn forecast_template(date: i64) -> FieldRef {
    BaseField::new(vec![0.0], Metadata::new())
        .with("param", "2t")
        .with("date", date)
        .with("time", TIME)
        .into_ref()
}
