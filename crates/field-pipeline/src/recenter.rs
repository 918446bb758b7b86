//! Longitude recentering of global regular grids.
//!
//! Some sources publish global lat/lon fields whose first column sits on
//! the antimeridian (180E). Models expect the first column on Greenwich,
//! so those fields are rolled by half a revolution along the longitude
//! axis and re-tagged.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use forecast_common::grid::keys;
use forecast_common::{
    Field, FieldRef, FieldSet, ForecastError, MetaValue, Metadata, RegularGeometry, Result,
};
use tracing::{debug, info};

use crate::stage::Stage;
use crate::wrap::{MetadataOverride, ValueOverride};

const EPSILON: f64 = 1e-6;

/// Rolls antimeridian-centred global grids onto a Greenwich origin.
///
/// Fields already starting at 0E, and fields that are not regular
/// lat/lon, pass through. Each distinct geometry is validated once; the
/// set of verified geometries lives as long as the stage.
#[derive(Debug, Default)]
pub struct Recenter {
    checked: Mutex<HashSet<String>>,
}

impl Recenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of geometries verified so far.
    pub fn checked_count(&self) -> usize {
        self.checked.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn needs_recentering(field: &dyn Field) -> bool {
        let regular = match field.metadata(keys::GRID_TYPE) {
            Some(MetaValue::Str(t)) => t == "regular_ll",
            Some(_) => false,
            None => true,
        };
        let lon_first = field.metadata(keys::LON_FIRST).and_then(|v| v.as_f64());
        regular && matches!(lon_first, Some(lon) if (lon.abs() - 180.0).abs() < EPSILON)
    }

    /// Validate a geometry, once per distinct set of geometry keys.
    fn check(&self, field: &dyn Field, geometry: &RegularGeometry) -> Result<()> {
        let key = format!(
            "{}/{}/{}/{}/{}/{}/{}/{}",
            geometry.lat_first,
            geometry.lon_first,
            geometry.lat_last,
            geometry.lon_last,
            geometry.di,
            geometry.dj,
            geometry.ni,
            geometry.nj
        );

        let mut checked = self
            .checked
            .lock()
            .map_err(|_| ForecastError::Integrity("recenter cache poisoned".to_string()))?;
        if checked.contains(&key) {
            return Ok(());
        }

        let fail = |what: &str| {
            Err(ForecastError::Integrity(format!(
                "cannot recenter {}: {}",
                field.describe(),
                what
            )))
        };

        if geometry.scanning_mode != 0 {
            return fail(&format!("scanning mode {}", geometry.scanning_mode));
        }
        if (geometry.lat_first - 90.0).abs() > EPSILON || (geometry.lat_last + 90.0).abs() > EPSILON {
            return fail(&format!(
                "latitudes {}..{} are not 90..-90",
                geometry.lat_first, geometry.lat_last
            ));
        }
        if (geometry.di - geometry.dj).abs() > EPSILON {
            return fail(&format!("increments {} x {} differ", geometry.di, geometry.dj));
        }
        if !geometry.is_global_in_longitude() || geometry.ni % 2 != 0 {
            return fail(&format!("Ni={} does not cover the globe evenly", geometry.ni));
        }
        let expected_nj = (180.0 / geometry.dj).round() as usize + 1;
        if geometry.nj != expected_nj {
            return fail(&format!("Nj={} expected {}", geometry.nj, expected_nj));
        }
        let expected_last = geometry.lon_first + 360.0 - geometry.di;
        let last = geometry.lon_last;
        if ((last - expected_last).rem_euclid(360.0)).min((expected_last - last).rem_euclid(360.0))
            > EPSILON
        {
            return fail(&format!("last longitude {} expected {}", last, expected_last));
        }
        // After rolling, column 0 must sit on Greenwich.
        let rolled_first = geometry.longitude(geometry.ni / 2).rem_euclid(360.0);
        if rolled_first.min(360.0 - rolled_first) > EPSILON {
            return fail(&format!("rolled first longitude is {}", rolled_first));
        }

        info!(geometry = %key, "Verified grid for recentering");
        checked.insert(key);
        Ok(())
    }

    fn recenter(&self, field: FieldRef) -> Result<FieldRef> {
        let geometry = RegularGeometry::from_field(field.as_ref())?;
        self.check(field.as_ref(), &geometry)?;

        let values = field.values();
        if values.len() != geometry.len() {
            return Err(ForecastError::Integrity(format!(
                "{} has {} values, expected {}x{}",
                field.describe(),
                values.len(),
                geometry.nj,
                geometry.ni
            )));
        }

        let ni = geometry.ni;
        let half = ni / 2;
        let mut rolled = Vec::with_capacity(values.len());
        for row in values.chunks(ni) {
            rolled.extend_from_slice(&row[half..]);
            rolled.extend_from_slice(&row[..half]);
        }

        let mut patch = Metadata::new();
        patch.insert(keys::LON_FIRST.to_string(), MetaValue::Float(0.0));
        patch.insert(
            keys::LON_LAST.to_string(),
            MetaValue::Float(360.0 - geometry.di),
        );

        let data: FieldRef =
            Arc::new(ValueOverride::new(field, rolled).with_shape(vec![geometry.nj, ni]));
        Ok(Arc::new(MetadataOverride::new(data, patch)))
    }
}

impl Stage for Recenter {
    fn name(&self) -> &str {
        "recenter"
    }

    fn apply(&self, fields: FieldSet) -> Result<FieldSet> {
        let mut out = FieldSet::empty();
        let mut rolled = 0usize;
        for field in fields {
            if Self::needs_recentering(field.as_ref()) {
                out.push(self.recenter(field)?);
                rolled += 1;
            } else {
                out.push(field);
            }
        }
        if rolled > 0 {
            debug!(count = rolled, "Recentered fields");
        }
        Ok(out)
    }
}
