//! Archive request bookkeeping.
//!
//! Every written field reports its archive keys. They are accumulated per
//! output path, and at the end of the run each path yields one archive
//! request listing every value seen per key plus the number of fields to
//! expect.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use forecast_common::{ForecastError, RequestValue, Result, RetrieveRequest};
use tracing::debug;

/// Keys that must hold a single value within one archive request.
pub const UNIQUE_KEYS: &[&str] = &[
    "date",
    "hdate",
    "time",
    "referenceDate",
    "type",
    "stream",
    "expver",
];

/// Accumulated keys of the fields written to one output path.
#[derive(Debug, Clone)]
pub struct ArchiveCollector {
    expect: usize,
    values: BTreeMap<String, BTreeSet<String>>,
    unique: Vec<String>,
}

impl Default for ArchiveCollector {
    fn default() -> Self {
        Self::with_unique_keys(UNIQUE_KEYS.iter().map(|k| k.to_string()).collect())
    }
}

impl ArchiveCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unique_keys(unique: Vec<String>) -> Self {
        Self {
            expect: 0,
            values: BTreeMap::new(),
            unique,
        }
    }

    /// Number of fields added so far.
    pub fn expect(&self) -> usize {
        self.expect
    }

    /// Distinct values seen for `key`.
    pub fn values(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.values.get(key)
    }

    /// Record the archive keys of one written field.
    ///
    /// A second distinct value for a unique key is an error and leaves
    /// the collector unchanged.
    pub fn add(&mut self, field: &BTreeMap<String, String>) -> Result<()> {
        for (key, value) in field {
            if !self.unique.iter().any(|u| u == key) {
                continue;
            }
            if let Some(seen) = self.values.get(key) {
                if !seen.contains(value) {
                    let mut values: Vec<String> = seen.iter().cloned().collect();
                    values.push(value.clone());
                    values.sort();
                    return Err(ForecastError::ArchiveConflict {
                        field: describe(field),
                        key: key.clone(),
                        values,
                    });
                }
            }
        }

        self.expect += 1;
        for (key, value) in field {
            self.values
                .entry(key.clone())
                .or_default()
                .insert(value.clone());
        }
        Ok(())
    }

    /// The archive request: `expect`, then every key; single values are
    /// scalars, several values a list.
    pub fn to_request(&self) -> RetrieveRequest {
        let mut request = RetrieveRequest::new().with("expect", self.expect as i64);
        for (key, values) in &self.values {
            let value = match values.len() {
                1 => RequestValue::from(values.iter().next().cloned().unwrap_or_default()),
                _ => RequestValue::list(values.iter().cloned()),
            };
            request.insert(key.as_str(), value);
        }
        request
    }
}

fn describe(field: &BTreeMap<String, String>) -> String {
    let parts: Vec<String> = field.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}

/// Archive collectors keyed by output path, in first-seen order.
///
/// Outputs that do not write to a file use the `None` path.
#[derive(Debug, Default)]
pub struct ArchiveBook {
    entries: Vec<(Option<PathBuf>, ArchiveCollector)>,
}

impl ArchiveBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: Option<&Path>, field: &BTreeMap<String, String>) -> Result<()> {
        let index = match self.entries.iter().position(|(p, _)| p.as_deref() == path) {
            Some(index) => index,
            None => {
                debug!(path = ?path, "New archive request");
                self.entries
                    .push((path.map(Path::to_path_buf), ArchiveCollector::new()));
                self.entries.len() - 1
            }
        };
        self.entries[index].1.add(field)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, path: Option<&Path>) -> Option<&ArchiveCollector> {
        self.entries
            .iter()
            .find(|(p, _)| p.as_deref() == path)
            .map(|(_, c)| c)
    }

    /// One archive request per path; `source="<path>"` is set when the
    /// path is known, and `extra` overrides everything else.
    pub fn finalise(&self, extra: &RetrieveRequest) -> Vec<RetrieveRequest> {
        self.entries
            .iter()
            .map(|(path, collector)| {
                let mut request = RetrieveRequest::new().with("expect", collector.expect as i64);
                if let Some(path) = path {
                    request.insert("source", format!("\"{}\"", path.display()));
                }
                request.merge(&collector.to_request());
                request.merge(extra);
                request
            })
            .collect()
    }
}
