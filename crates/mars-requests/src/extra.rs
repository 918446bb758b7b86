//! User request overrides given on the command line.

use forecast_common::{ForecastError, Result, RetrieveRequest};

/// Parse user overrides written as `k1=v1,k2=v2`.
///
/// Values stay strings; a value may itself hold `/`-separated lists. An
/// empty input yields an empty request.
pub fn parse_requests_extra(text: &str) -> Result<RetrieveRequest> {
    let mut extra = RetrieveRequest::new();
    let text = text.trim();
    if text.is_empty() {
        return Ok(extra);
    }

    for item in text.split(',') {
        let (key, value) = item.split_once('=').ok_or_else(|| {
            ForecastError::config("requests_extra", format!("'{}' is not key=value", item))
        })?;
        let key = key.trim();
        if key.is_empty() || value.contains('=') {
            return Err(ForecastError::config(
                "requests_extra",
                format!("'{}' is not key=value", item),
            ));
        }
        extra.insert(key, value.trim());
    }
    Ok(extra)
}
