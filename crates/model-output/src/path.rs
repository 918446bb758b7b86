//! Output path templates such as `out/{date}/{param}_{levelist}.grib`.

use std::path::PathBuf;

use forecast_common::{ForecastError, Metadata, Result};

/// A path with `{key}` placeholders filled from field metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTemplate {
    template: String,
    keys: Vec<String>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let mut keys = Vec::new();
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                ForecastError::config("path", format!("unclosed '{{' in '{}'", template))
            })?;
            let key = &after[..end];
            if key.is_empty() || key.contains('{') {
                return Err(ForecastError::config(
                    "path",
                    format!("bad placeholder in '{}'", template),
                ));
            }
            keys.push(key.to_string());
            rest = &after[end + 1..];
        }
        if rest.contains('}') {
            return Err(ForecastError::config("path", format!("stray '}}' in '{}'", template)));
        }

        Ok(Self {
            template: template.to_string(),
            keys,
        })
    }

    /// Whether different fields may land in different files.
    pub fn is_split(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill every placeholder from `metadata`. A key missing from the
    /// field is an error.
    pub fn render(&self, metadata: &Metadata) -> Result<PathBuf> {
        let mut path = self.template.clone();
        for key in &self.keys {
            let value = metadata.get(key).filter(|v| !v.is_null()).ok_or_else(|| {
                ForecastError::Integrity(format!(
                    "Cannot build output path '{}': field has no '{}'",
                    self.template, key
                ))
            })?;
            path = path.replace(&format!("{{{}}}", key), &value.to_string());
        }
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::MetaValue;

    fn metadata() -> Metadata {
        [
            ("param".to_string(), MetaValue::from("2t")),
            ("date".to_string(), MetaValue::from(20230101i64)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_plain_path() {
        let t = PathTemplate::parse("out.grib").unwrap();
        assert!(!t.is_split());
        assert_eq!(t.render(&Metadata::new()).unwrap(), PathBuf::from("out.grib"));
    }

    #[test]
    fn test_split_path() {
        let t = PathTemplate::parse("out/{date}/{param}.grib").unwrap();
        assert_eq!(t.keys(), ["date", "param"]);
        assert_eq!(
            t.render(&metadata()).unwrap(),
            PathBuf::from("out/20230101/2t.grib")
        );
    }

    #[test]
    fn test_missing_key() {
        let t = PathTemplate::parse("{levelist}.grib").unwrap();
        assert!(matches!(t.render(&metadata()), Err(ForecastError::Integrity(_))));
    }

    #[test]
    fn test_malformed() {
        for bad in ["{param", "param}", "{}", "{a{b}"] {
            assert!(PathTemplate::parse(bad).is_err(), "{bad}");
        }
    }
}
