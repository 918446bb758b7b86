//! Validation of retrieved fields against the request that produced them.

use std::collections::BTreeSet;

use forecast_common::{FieldSet, ForecastError, RetrieveRequest, Result};

/// Check that the `keys` combinations found in `fields` are exactly the
/// Cartesian product of the request values for those keys.
///
/// `what` names the level type in error messages (`PL`, `SFC`, `ML`).
/// Missing combinations are reported before unexpected ones, each list
/// sorted. A single key is shown bare (`u`), several as a tuple
/// (`(u, 500)`).
pub fn check_combinations(
    fields: &FieldSet,
    request: &RetrieveRequest,
    what: &str,
    keys: &[&str],
) -> Result<()> {
    let expected = expected_combinations(request, keys);

    let found: BTreeSet<Vec<String>> = fields
        .iter()
        .map(|f| {
            keys.iter()
                .map(|k| f.metadata(k).map(|v| v.to_string()).unwrap_or_else(|| "None".to_string()))
                .collect()
        })
        .collect();

    let missing: Vec<String> = expected.difference(&found).map(|c| label(c)).collect();
    if !missing.is_empty() {
        return Err(ForecastError::MissingCombinations {
            what: what.to_string(),
            missing,
        });
    }

    let extra: Vec<String> = found.difference(&expected).map(|c| label(c)).collect();
    if !extra.is_empty() {
        return Err(ForecastError::UnexpectedCombinations {
            what: what.to_string(),
            extra,
        });
    }

    Ok(())
}

fn expected_combinations(request: &RetrieveRequest, keys: &[&str]) -> BTreeSet<Vec<String>> {
    let mut product: Vec<Vec<String>> = vec![Vec::new()];
    for key in keys {
        let values = request.strings(key);
        product = product
            .into_iter()
            .flat_map(|prefix| {
                values.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect();
    }
    product.into_iter().collect()
}

fn label(combination: &[String]) -> String {
    match combination {
        [single] => single.clone(),
        many => format!("({})", many.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::{BaseField, FieldRef, Metadata};

    fn pl(param: &str, level: i64) -> FieldRef {
        BaseField::new(vec![0.0], Metadata::new())
            .with("param", param)
            .with("levelist", level)
            .into_ref()
    }

    fn request() -> RetrieveRequest {
        RetrieveRequest::new()
            .with("param", vec!["t", "u"])
            .with("levelist", vec![500i64, 850])
    }

    #[test]
    fn test_exact_product_passes() {
        let fields = FieldSet::new(vec![pl("t", 500), pl("t", 850), pl("u", 500), pl("u", 850)]);
        check_combinations(&fields, &request(), "PL", &["param", "levelist"]).unwrap();
    }

    #[test]
    fn test_every_missing_pair_named() {
        let fields = FieldSet::new(vec![pl("t", 500)]);
        let err = check_combinations(&fields, &request(), "PL", &["param", "levelist"]).unwrap_err();
        match &err {
            ForecastError::MissingCombinations { missing, .. } => {
                assert_eq!(missing, &vec!["(t, 850)", "(u, 500)", "(u, 850)"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().starts_with("The following PL parameters ["));
    }

    #[test]
    fn test_single_missing_is_singular() {
        let fields = FieldSet::new(vec![pl("t", 500), pl("t", 850), pl("u", 500)]);
        let err = check_combinations(&fields, &request(), "PL", &["param", "levelist"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The following PL parameter '(u, 850)' is not available"
        );
    }

    #[test]
    fn test_unexpected_combination() {
        let request = RetrieveRequest::new().with("param", vec!["2t"]);
        let fields = FieldSet::new(vec![pl("2t", 0), pl("msl", 0)]);
        let err = check_combinations(&fields, &request, "SFC", &["param"]).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected SFC parameter 'msl' returned");
    }
}
