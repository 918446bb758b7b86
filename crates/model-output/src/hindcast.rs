//! Hindcast relabeling.
//!
//! A forecast started from a historical date is archived under a
//! reference date: `hdate` carries the historical date and
//! `referenceDate` the date the hindcast belongs to. The reference date is
//! either given outright or built from a reference year and the month and
//! day of the field's own date.
//!
//! Fields that already come from a hindcast source carry `hdate`; their
//! `date` must already be the reference date.

use forecast_common::{FieldRef, ForecastError, MetaValue, Result};
use tracing::warn;

use crate::output::{FieldOutput, Overrides, Written};

/// Where the reference date comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceDate {
    /// Use this year with the month and day of each field's date.
    Year(i64),
    /// Use this `YYYYMMDD` date for every field.
    Date(i64),
}

impl ReferenceDate {
    /// An explicit date wins over a year. Neither is a configuration
    /// error.
    pub fn from_options(year: Option<i64>, date: Option<i64>) -> Result<Self> {
        match (date, year) {
            (Some(date), _) => Ok(ReferenceDate::Date(date)),
            (None, Some(year)) => Ok(ReferenceDate::Year(year)),
            (None, None) => Err(ForecastError::config(
                "hindcast_reference",
                "a reference year or a reference date is required",
            )),
        }
    }

    pub fn for_date(&self, date: i64) -> i64 {
        match *self {
            ReferenceDate::Date(d) => d,
            ReferenceDate::Year(y) => y * 10000 + date % 10000,
        }
    }
}

/// Relabels `date`/`hdate` before handing each field to `inner`.
///
/// Written fields are checked against the requested keys unless the
/// caller explicitly turns checking off.
pub struct HindcastRelabel<O> {
    inner: O,
    reference: ReferenceDate,
}

impl<O: FieldOutput> HindcastRelabel<O> {
    pub fn new(inner: O, reference: ReferenceDate) -> Self {
        Self { inner, reference }
    }

    pub fn reference(&self) -> ReferenceDate {
        self.reference
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }

    /// Date keys for a field written from `template`.
    fn relabel(&self, template: &FieldRef, mut overrides: Overrides) -> Result<Overrides> {
        for key in ["hdate", "date"] {
            if let Some(value) = overrides.remove(key) {
                warn!(key, value = %value, "Ignoring caller-supplied key in hindcast relabeling");
            }
        }

        let date = template
            .metadata("date")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                ForecastError::Integrity(format!("{} has no usable date", template.describe()))
            })?;
        let reference_date = self.reference.for_date(date);

        match template.metadata("hdate") {
            Some(hdate) => {
                if date != reference_date {
                    return Err(ForecastError::HindcastMismatch {
                        date,
                        reference_date,
                        hdate: hdate.to_string(),
                    });
                }
                overrides.insert("referenceDate", reference_date);
                overrides.insert("hdate", hdate);
            }
            None => {
                overrides.insert("referenceDate", reference_date);
                overrides.insert("hdate", MetaValue::Int(date));
            }
        }

        overrides.check.get_or_insert(true);
        Ok(overrides)
    }
}

impl<O: FieldOutput> FieldOutput for HindcastRelabel<O> {
    fn write(
        &mut self,
        values: Option<&[f64]>,
        template: &FieldRef,
        overrides: Overrides,
    ) -> Result<Option<Written>> {
        let overrides = self.relabel(template, overrides)?;
        self.inner.write(values, template, overrides)
    }

    fn finalise(&mut self) -> Result<()> {
        self.inner.finalise()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_common::{BaseField, Metadata};

    /// Records the overrides it is given.
    #[derive(Default)]
    struct Recorder(Vec<Overrides>);

    impl FieldOutput for Recorder {
        fn write(&mut self, _values: Option<&[f64]>, _template: &FieldRef, overrides: Overrides) -> Result<Option<Written>> {
            self.0.push(overrides);
            Ok(None)
        }
    }

    fn template(date: i64, hdate: Option<i64>) -> FieldRef {
        let mut f = BaseField::new(vec![0.0], Metadata::new()).with("date", date);
        if let Some(hdate) = hdate {
            f = f.with("hdate", hdate);
        }
        f.into_ref()
    }

    #[test]
    fn test_reference_date_from_year() {
        assert_eq!(ReferenceDate::Year(2024).for_date(20150301), 20240301);
        assert_eq!(ReferenceDate::Date(20240101).for_date(20150301), 20240101);
        assert_eq!(
            ReferenceDate::from_options(Some(2024), Some(20240101)).unwrap(),
            ReferenceDate::Date(20240101)
        );
        assert!(ReferenceDate::from_options(None, None).is_err());
    }

    #[test]
    fn test_forecast_template_becomes_hindcast() {
        let mut out = HindcastRelabel::new(Recorder::default(), ReferenceDate::Year(2024));
        out.write(None, &template(20150301, None), Overrides::new()).unwrap();

        let o = &out.inner().0[0];
        assert_eq!(o.get("referenceDate"), Some(&MetaValue::Int(20240301)));
        assert_eq!(o.get("hdate"), Some(&MetaValue::Int(20150301)));
        assert_eq!(o.check, Some(true));
    }

    #[test]
    fn test_caller_dates_are_dropped() {
        let mut out = HindcastRelabel::new(Recorder::default(), ReferenceDate::Year(2024));
        let overrides = Overrides::new()
            .set("date", 19990101i64)
            .set("hdate", 19990101i64)
            .set("step", 6i64)
            .check(false);
        out.write(None, &template(20150301, None), overrides).unwrap();

        let o = &out.inner().0[0];
        assert!(o.get("date").is_none());
        assert_eq!(o.get("hdate"), Some(&MetaValue::Int(20150301)));
        assert_eq!(o.get("step"), Some(&MetaValue::Int(6)));
        assert_eq!(o.check, Some(false));
    }
}
