//! Client for running a model on a remote inference server.
//!
//! The job protocol is plain REST over HTTPS with bearer-token
//! authentication:
//!
//! 1. `POST upload` with the input file, answered by `{status: success, href}`
//! 2. `POST <href>` with the job configuration, answered by
//!    `{status: queued, href, id}`
//! 3. `GET <href>` until the status is `ready` or `failed`, optionally with
//!    a `progress` block
//! 4. `GET <href>` of the last reply to fetch the result
//!
//! [`RemoteJobClient`] drives these steps. All HTTP goes through a
//! [`Transport`], which retries transient failures on its own.

pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod progress;
pub mod transport;

pub use api::{MetadataQuery, RemoteApi};
pub use config::{config_path, ApiFile, ConfigSources, RemoteConfig, API_URL, TOKEN_ENV, URL_ENV};
pub use error::{RemoteError, Result};
pub use job::{JobOutcome, JobState, RemoteJobClient};
pub use progress::{JobProgress, ProgressDisplay};
pub use transport::{Body, HttpTransport, Method, Reply, RetryConfig, Transport};
