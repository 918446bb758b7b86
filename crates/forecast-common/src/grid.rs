//! Grid descriptors for model input and output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::field::{Field, MetaValue, Metadata};
use crate::request::RequestValue;

/// A grid as named in model configuration and retrieval requests.
///
/// Either regular lat/lon increments (`[0.25, 0.25]`) or a named grid
/// (`N320`, `O96`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grid {
    Regular([f64; 2]),
    Named(String),
}

impl Grid {
    /// Hashable key identifying this grid.
    pub fn key(&self) -> String {
        self.to_string()
    }

    pub fn to_request_value(&self) -> RequestValue {
        match self {
            Grid::Regular([dx, dy]) => RequestValue::list(vec![*dx, *dy]),
            Grid::Named(name) => RequestValue::from(name.as_str()),
        }
    }

    /// Read the `grid` value of a request.
    pub fn from_request_value(value: &RequestValue) -> Result<Grid> {
        let items = value.items();
        match items.as_slice() {
            [dx, dy] => match (dx.as_f64(), dy.as_f64()) {
                (Some(dx), Some(dy)) => Ok(Grid::Regular([dx, dy])),
                _ => Err(ForecastError::config("grid", format!("cannot parse {}/{}", dx, dy))),
            },
            [single] => Grid::parse(&single.to_string()),
            _ => Err(ForecastError::config("grid", "expected two increments or a grid name")),
        }
    }

    /// Parse a request/CLI value: `0.25/0.25`, `0.25,0.25` or `N320`.
    pub fn parse(s: &str) -> Result<Grid> {
        let parts: Vec<&str> = s.split(['/', ',']).map(str::trim).collect();
        match parts.as_slice() {
            [dx, dy] => {
                let dx = dx.parse::<f64>();
                let dy = dy.parse::<f64>();
                match (dx, dy) {
                    (Ok(dx), Ok(dy)) => Ok(Grid::Regular([dx, dy])),
                    _ => Err(ForecastError::config("grid", format!("cannot parse '{}'", s))),
                }
            }
            [name] if !name.is_empty() => Ok(Grid::Named(name.to_string())),
            _ => Err(ForecastError::config("grid", format!("cannot parse '{}'", s))),
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grid::Regular([dx, dy]) => write!(f, "{}/{}", dx, dy),
            Grid::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Metadata keys describing a regular lat/lon grid.
pub mod keys {
    pub const LAT_FIRST: &str = "latitudeOfFirstGridPointInDegrees";
    pub const LON_FIRST: &str = "longitudeOfFirstGridPointInDegrees";
    pub const LAT_LAST: &str = "latitudeOfLastGridPointInDegrees";
    pub const LON_LAST: &str = "longitudeOfLastGridPointInDegrees";
    pub const DI: &str = "iDirectionIncrementInDegrees";
    pub const DJ: &str = "jDirectionIncrementInDegrees";
    pub const NI: &str = "Ni";
    pub const NJ: &str = "Nj";
    pub const SCANNING_MODE: &str = "scanningMode";
    pub const GRID_TYPE: &str = "gridType";
}

/// Geometry of a regular lat/lon grid, read from field metadata.
///
/// Data is row-major, north to south, west to east (scanning mode 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularGeometry {
    pub lat_first: f64,
    pub lon_first: f64,
    pub lat_last: f64,
    pub lon_last: f64,
    pub di: f64,
    pub dj: f64,
    pub ni: usize,
    pub nj: usize,
    pub scanning_mode: i64,
}

impl RegularGeometry {
    /// Global grid with origin at 90N / 0E for the given increments.
    pub fn global(di: f64, dj: f64) -> Self {
        let ni = (360.0 / di).round() as usize;
        let nj = (180.0 / dj).round() as usize + 1;
        Self {
            lat_first: 90.0,
            lon_first: 0.0,
            lat_last: -90.0,
            lon_last: 360.0 - di,
            di,
            dj,
            ni,
            nj,
            scanning_mode: 0,
        }
    }

    /// Read the geometry keys of a field.
    pub fn from_field(field: &dyn Field) -> Result<Self> {
        let float = |key: &str| -> Result<f64> {
            field.metadata(key).and_then(|v| v.as_f64()).ok_or_else(|| {
                ForecastError::Integrity(format!("{} has no '{}'", field.describe(), key))
            })
        };
        let int = |key: &str| -> Result<i64> {
            field.metadata(key).and_then(|v| v.as_i64()).ok_or_else(|| {
                ForecastError::Integrity(format!("{} has no '{}'", field.describe(), key))
            })
        };

        Ok(Self {
            lat_first: float(keys::LAT_FIRST)?,
            lon_first: float(keys::LON_FIRST)?,
            lat_last: float(keys::LAT_LAST)?,
            lon_last: float(keys::LON_LAST)?,
            di: float(keys::DI)?,
            dj: float(keys::DJ)?,
            ni: int(keys::NI)? as usize,
            nj: int(keys::NJ)? as usize,
            scanning_mode: field
                .metadata(keys::SCANNING_MODE)
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        })
    }

    /// Metadata keys describing this geometry.
    pub fn to_metadata(&self) -> Metadata {
        let mut md = Metadata::new();
        md.insert(keys::LAT_FIRST.into(), MetaValue::Float(self.lat_first));
        md.insert(keys::LON_FIRST.into(), MetaValue::Float(self.lon_first));
        md.insert(keys::LAT_LAST.into(), MetaValue::Float(self.lat_last));
        md.insert(keys::LON_LAST.into(), MetaValue::Float(self.lon_last));
        md.insert(keys::DI.into(), MetaValue::Float(self.di));
        md.insert(keys::DJ.into(), MetaValue::Float(self.dj));
        md.insert(keys::NI.into(), MetaValue::from(self.ni));
        md.insert(keys::NJ.into(), MetaValue::from(self.nj));
        md.insert(keys::GRID_TYPE.into(), MetaValue::from("regular_ll"));
        md
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.ni * self.nj
    }

    pub fn is_empty(&self) -> bool {
        self.ni == 0 || self.nj == 0
    }

    /// Whether the grid wraps around the globe in longitude.
    pub fn is_global_in_longitude(&self) -> bool {
        ((self.ni as f64) * self.di - 360.0).abs() < 1e-6
    }

    /// Latitude of row `j`.
    pub fn latitude(&self, j: usize) -> f64 {
        self.lat_first - j as f64 * self.dj
    }

    /// Longitude of column `i`.
    pub fn longitude(&self, i: usize) -> f64 {
        self.lon_first + i as f64 * self.di
    }
}
