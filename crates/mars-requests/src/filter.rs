//! Request filters: by field type, then by date.

use std::fmt;
use std::str::FromStr;

use forecast_common::{ForecastError, RequestValue, RetrieveRequest, RunDateTime};
use serde::{Deserialize, Serialize};

/// Which fields to retrieve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldsType {
    #[default]
    All,
    /// Only time-invariant surface fields.
    Constants,
    /// Everything except time-invariant surface fields.
    Prognostics,
}

impl FromStr for FieldsType {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(FieldsType::All),
            "constants" => Ok(FieldsType::Constants),
            "prognostics" => Ok(FieldsType::Prognostics),
            other => Err(ForecastError::config(
                "retrieve_fields_type",
                format!("'{}' is not one of all, constants, prognostics", other),
            )),
        }
    }
}

impl fmt::Display for FieldsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldsType::All => "all",
            FieldsType::Constants => "constants",
            FieldsType::Prognostics => "prognostics",
        };
        write!(f, "{}", s)
    }
}

/// Type filter followed by an optional latest-date filter.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub fields_type: FieldsType,
    pub only_last_date: bool,
    /// Parameters considered time-invariant.
    pub constant_fields: Vec<String>,
}

impl RequestFilter {
    pub fn new(fields_type: FieldsType, constant_fields: Vec<String>) -> Self {
        Self {
            fields_type,
            only_last_date: false,
            constant_fields,
        }
    }

    pub fn only_last_date(mut self, only_last_date: bool) -> Self {
        self.only_last_date = only_last_date;
        self
    }

    /// Filter `requests`; `dates` are the (date, time) pairs they were
    /// built from.
    pub fn apply(&self, requests: Vec<RetrieveRequest>, dates: &[RunDateTime]) -> Vec<RetrieveRequest> {
        let latest = dates.iter().max().copied();
        requests
            .into_iter()
            .filter_map(|r| self.by_type(r))
            .filter(|r| !self.only_last_date || latest.map_or(true, |dt| is_at(r, dt)))
            .collect()
    }

    fn by_type(&self, mut request: RetrieveRequest) -> Option<RetrieveRequest> {
        // levtype is checked because `z` is also a pressure-level parameter
        let surface = request.strings("levtype") == ["sfc"];
        let is_constant = |p: &String| self.constant_fields.contains(p);

        match self.fields_type {
            FieldsType::All => Some(request),
            FieldsType::Constants => {
                if !surface {
                    return None;
                }
                let params: Vec<String> =
                    request.strings("param").into_iter().filter(is_constant).collect();
                narrowed(&mut request, params).then_some(request)
            }
            FieldsType::Prognostics => {
                if !surface {
                    return Some(request);
                }
                let params: Vec<String> = request
                    .strings("param")
                    .into_iter()
                    .filter(|p| !is_constant(p))
                    .collect();
                narrowed(&mut request, params).then_some(request)
            }
        }
    }
}

/// Replace `param` with `params`; false when nothing is left.
fn narrowed(request: &mut RetrieveRequest, params: Vec<String>) -> bool {
    if params.is_empty() {
        return false;
    }
    request.insert("param", RequestValue::from(params));
    true
}

fn is_at(request: &RetrieveRequest, dt: RunDateTime) -> bool {
    let value = |key: &str| request.scalar(key).and_then(|v| v.as_i64());
    value("date") == Some(dt.date as i64) && value("time") == Some(dt.time as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> Vec<String> {
        vec!["z".into(), "sdor".into(), "slor".into()]
    }

    fn sfc() -> RetrieveRequest {
        RetrieveRequest::new()
            .with("levtype", "sfc")
            .with("param", vec!["2t", "z"])
            .with("date", 20230101i64)
            .with("time", 0i64)
    }

    fn pl() -> RetrieveRequest {
        RetrieveRequest::new()
            .with("levtype", "pl")
            .with("param", vec!["t", "z"])
            .with("date", 20230101i64)
            .with("time", 0i64)
    }

    #[test]
    fn test_constants_narrows_surface() {
        let filter = RequestFilter::new(FieldsType::Constants, constants());
        let out = filter.apply(vec![pl(), sfc()], &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strings("param"), vec!["z"]);
        assert_eq!(out[0].strings("levtype"), vec!["sfc"]);
    }

    #[test]
    fn test_prognostics_narrows_surface_keeps_upper_air() {
        let filter = RequestFilter::new(FieldsType::Prognostics, constants());
        let out = filter.apply(vec![pl(), sfc()], &[]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].strings("param"), vec!["t", "z"]);
        assert_eq!(out[1].strings("param"), vec!["2t"]);
    }

    #[test]
    fn test_constants_drops_surface_without_intersection() {
        let filter = RequestFilter::new(FieldsType::Constants, constants());
        let only_2t = sfc().with("param", vec!["2t"]);
        assert!(filter.apply(vec![only_2t], &[]).is_empty());
    }

    #[test]
    fn test_only_last_date() {
        let dates = [RunDateTime::new(20230101, 0), RunDateTime::new(20230101, 600)];
        let late = sfc().with("time", 600i64);
        let filter = RequestFilter::default().only_last_date(true);

        let out = filter.apply(vec![sfc(), late.clone(), pl()], &dates);
        assert_eq!(out, vec![late]);
    }

    #[test]
    fn test_fields_type_parse() {
        assert_eq!("Constants".parse::<FieldsType>().unwrap(), FieldsType::Constants);
        assert!("some".parse::<FieldsType>().is_err());
        assert_eq!(FieldsType::Prognostics.to_string(), "prognostics");
    }
}
