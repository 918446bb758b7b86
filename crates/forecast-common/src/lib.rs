//! Common types shared across the forecast runner crates.

pub mod error;
pub mod field;
pub mod fieldset;
pub mod grid;
pub mod model;
pub mod request;
pub mod time;

pub use error::{ForecastError, Result};
pub use field::{BaseField, Field, FieldRef, MetaValue, Metadata};
pub use fieldset::FieldSet;
pub use grid::{Grid, RegularGeometry};
pub use model::{ModelSpec, ParamLevels};
pub use request::{NoPatch, RequestPatch, RequestValue, RetrieveRequest, GEOMETRY_KEYS};
pub use time::{datetimes, normalize_time, RunDateTime};
