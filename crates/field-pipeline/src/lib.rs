//! Field transformation pipeline.
//!
//! Retrieved fields are never modified in place. Each stage returns new
//! handles that wrap the originals and override their values or selected
//! metadata keys:
//!
//! - [`ValueOverride`] replaces the numeric payload
//! - [`MetadataOverride`] replaces (or hides) metadata keys
//!
//! Stages compose into a [`Pipeline`] and run in a fixed order per input
//! source: recenter, unit conversion, interpolation, relabel.

pub mod check;
pub mod compute;
pub mod constants;
pub mod input;
pub mod interpolate;
pub mod recenter;
pub mod relabel;
pub mod stage;
pub mod wrap;

pub use check::check_combinations;
pub use compute::{UnitConversion, STANDARD_GRAVITY};
pub use constants::{
    constants_path, constants_url, default_cache_dir, substitute_constants, ConstantsStore,
    FieldDecoder, FileConstantsStore, MemoryConstantsStore, CONSTANT_PARAMS,
};
pub use input::{opendata_resolution, FieldSource, RequestBasedInput, Resolution};
pub use interpolate::{BilinearRegridder, GridTemplateCache, Interpolate, Regridder};
pub use recenter::Recenter;
pub use relabel::Relabel;
pub use stage::{Identity, Pipeline, Stage};
pub use wrap::{MetadataOverride, ValueOverride};
