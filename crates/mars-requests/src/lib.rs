//! Retrieval and archive requests.
//!
//! - [`RequestBuilder`] turns a model description and its run dates into
//!   retrieval requests, and [`RequestFilter`] narrows them by field type
//!   and date.
//! - [`ArchiveBook`] collects the keys of every written field per output
//!   path and produces the matching archive requests.
//! - [`format`] renders either kind as MARS-style text or JSON.

pub mod archive;
pub mod builder;
pub mod extra;
pub mod filter;
pub mod format;

pub use archive::{ArchiveBook, ArchiveCollector, UNIQUE_KEYS};
pub use builder::{RequestBuilder, SharedKeys, DEFAULT_TARGET};
pub use extra::parse_requests_extra;
pub use filter::{FieldsType, RequestFilter};
pub use format::{render_json_compact, render_json_pretty, render_pretty, write_pretty};
