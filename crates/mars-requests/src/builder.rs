//! Retrieval request construction.
//!
//! For every (date, time) pair the builder emits a pressure-level request
//! followed by a surface request. Keys shared by the whole run (`target`,
//! `grid`, `area` and the model's extra retrieve keys) are written on the
//! first pressure-level and surface requests only; readers of a request
//! file inherit them from the requests above.

use std::sync::Arc;

use forecast_common::{ModelSpec, NoPatch, RequestPatch, RetrieveRequest, RunDateTime};
use tracing::debug;

/// Default value of the `target` key.
pub const DEFAULT_TARGET: &str = "input.grib";

/// Which shared keys are written on the first (date, time) pair only.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SharedKeys {
    /// Every shared key (`target`, `grid`, `area`, extra retrieve keys).
    #[default]
    All,
    /// Only these keys; other shared keys repeat on every request.
    Only(Vec<String>),
}

impl SharedKeys {
    fn elides(&self, key: &str) -> bool {
        match self {
            SharedKeys::All => true,
            SharedKeys::Only(keys) => keys.iter().any(|k| k == key),
        }
    }
}

/// Builds the retrieval requests for a model run.
pub struct RequestBuilder<'a> {
    spec: &'a ModelSpec,
    dates: Vec<RunDateTime>,
    target: String,
    shared_keys: SharedKeys,
    extra: RetrieveRequest,
    patch: Arc<dyn RequestPatch>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(spec: &'a ModelSpec, dates: Vec<RunDateTime>) -> Self {
        Self {
            spec,
            dates,
            target: DEFAULT_TARGET.to_string(),
            shared_keys: SharedKeys::All,
            extra: RetrieveRequest::new(),
            patch: Arc::new(NoPatch),
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn shared_keys(mut self, shared_keys: SharedKeys) -> Self {
        self.shared_keys = shared_keys;
        self
    }

    /// User overrides merged into every request.
    pub fn requests_extra(mut self, extra: RetrieveRequest) -> Self {
        self.extra = extra;
        self
    }

    /// Hook run on every request after it is built.
    pub fn patch(mut self, patch: Arc<dyn RequestPatch>) -> Self {
        self.patch = patch;
        self
    }

    pub fn dates(&self) -> &[RunDateTime] {
        &self.dates
    }

    /// Keys and values shared by every request of the run.
    fn shared(&self) -> RetrieveRequest {
        let mut shared = RetrieveRequest::new()
            .with("target", self.target.as_str())
            .with("grid", self.spec.grid.to_request_value());
        if let Some(area) = &self.spec.area {
            shared.insert("area", area.clone());
        }
        shared.merge(&self.spec.retrieve);
        shared
    }

    /// Pressure-level then surface request for each (date, time) pair.
    pub fn build(&self) -> Vec<RetrieveRequest> {
        let shared = self.shared();
        let repeated: RetrieveRequest = shared
            .iter()
            .filter(|(k, _)| !self.shared_keys.elides(k))
            .fold(RetrieveRequest::new(), |r, (k, v)| r.with(k, v.clone()));

        let pl = &self.spec.param_level_pl;
        let mut requests = Vec::with_capacity(self.dates.len() * 2);

        for (i, dt) in self.dates.iter().enumerate() {
            let first = i == 0;
            let carried = if first { &shared } else { &repeated };

            let mut upper = RetrieveRequest::new()
                .with("levtype", "pl")
                .with("levelist", pl.levels.clone())
                .with("param", pl.params.clone())
                .with("date", dt.date)
                .with("time", dt.time);
            upper.merge(carried);
            upper.merge(&self.extra);
            self.patch.patch(&mut upper);

            let mut surface = RetrieveRequest::new()
                .with("levtype", "sfc")
                .with("param", self.spec.param_sfc.clone())
                .with("date", dt.date)
                .with("time", dt.time);
            surface.merge(carried);
            surface.merge(&self.extra);
            self.patch.patch(&mut surface);

            requests.push(upper);
            requests.push(surface);
        }

        debug!(count = requests.len(), "Built retrieval requests");
        requests
    }
}
