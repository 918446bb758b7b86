//! Write boundary for model results.
//!
//! Models hand each result field to a [`FieldOutput`] together with the
//! input field it was derived from (the template) and the metadata to
//! change. Outputs return a [`Written`] handle whose archive keys feed
//! archive request bookkeeping.
//!
//! - [`FileOutput`] encodes fields with a [`FieldEncoder`] and writes them
//!   to files named by a [`PathTemplate`]
//! - [`NoneOutput`] discards results
//! - [`HindcastRelabel`] rewrites date keys for hindcast archiving and
//!   forwards to another output

pub mod encode;
pub mod file;
pub mod hindcast;
pub mod none;
pub mod output;
pub mod path;

pub use encode::{Encoded, FieldEncoder, JsonLinesEncoder};
pub use file::{FileOutput, FileOutputConfig, DEFAULT_EDITION};
pub use hindcast::{HindcastRelabel, ReferenceDate};
pub use none::NoneOutput;
pub use output::{FieldOutput, Overrides, Written, WrittenHandle, MARS_KEYS};
pub use path::PathTemplate;
