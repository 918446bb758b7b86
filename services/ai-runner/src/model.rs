//! A configured model run: which fields it needs, where its results go,
//! and the archive requests describing them.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use forecast_common::time::valid_datetime;
use forecast_common::{FieldRef, FieldSet, MetaValue, RetrieveRequest, RunDateTime};
use mars_requests::{
    render_json_compact, render_json_pretty, write_pretty, ArchiveBook, FieldsType,
    RequestBuilder, RequestFilter,
};
use model_output::{FieldOutput, Overrides, Written};
use tracing::{debug, info};

use crate::config::ModelConfig;

/// How retrieval and archive requests are printed.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Where archive requests go; none disables archive bookkeeping.
    pub archive_requests: Option<PathBuf>,
    pub requests_extra: RetrieveRequest,
    pub json: bool,
    pub fields_type: FieldsType,
    pub only_last_date: bool,
}

pub struct Model {
    pub name: String,
    pub config: ModelConfig,
    pub dates: Vec<RunDateTime>,
    output: Box<dyn FieldOutput>,
    archive: ArchiveBook,
    options: RequestOptions,
}

impl Model {
    pub fn new(
        name: impl Into<String>,
        config: ModelConfig,
        dates: Vec<RunDateTime>,
        output: Box<dyn FieldOutput>,
        options: RequestOptions,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            dates,
            output,
            archive: ArchiveBook::new(),
            options,
        }
    }

    pub fn archive(&self) -> &ArchiveBook {
        &self.archive
    }

    /// Write one result field. The model's extra output metadata fills
    /// keys the caller did not set.
    pub fn write(&mut self, values: Option<&[f64]>, template: &FieldRef, mut overrides: Overrides) -> Result<()> {
        for (key, value) in &self.config.grib_extra_metadata {
            overrides
                .keys
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        if let Some(written) = self.output.write(values, template, overrides)? {
            self.collect_archive_requests(&written)?;
        }
        Ok(())
    }

    /// Record the archive keys of a written field under its path.
    pub fn collect_archive_requests(&mut self, written: &Written) -> Result<()> {
        if self.options.archive_requests.is_none() {
            return Ok(());
        }
        self.archive
            .add(written.path.as_deref(), &written.handle.as_mars())?;
        Ok(())
    }

    /// Close the output and write the archive requests, if asked for.
    pub fn finalise(&mut self) -> Result<()> {
        self.output.finalise()?;

        let Some(path) = &self.options.archive_requests else {
            return Ok(());
        };
        let requests = self.archive.finalise(&self.options.requests_extra);
        let file = File::create(path)
            .with_context(|| format!("Failed to create archive requests file: {}", path.display()))?;
        let mut out = BufWriter::new(file);

        if self.options.json {
            writeln!(out, "{}", render_json_compact(&requests)?)?;
        } else {
            write_pretty(&mut out, "archive", &requests)?;
        }
        out.flush()?;

        info!(path = %path.display(), count = requests.len(), "Wrote archive requests");
        Ok(())
    }

    /// Input fields: grid, area and parameters per level type.
    pub fn print_fields<W: Write>(&self, out: &mut W) -> Result<()> {
        let spec = &self.config.spec;
        let area = match &spec.area {
            Some(area) => format!("{:?}", area),
            None => "None".to_string(),
        };
        writeln!(out, "Grid: {}", spec.grid)?;
        writeln!(out, "Area: {}", area)?;
        writeln!(out, "Pressure levels:")?;
        writeln!(out, "   Levels: {:?}", spec.param_level_pl.levels)?;
        writeln!(out, "   Params: {:?}", spec.param_level_pl.params)?;
        writeln!(out, "Single levels:")?;
        writeln!(out, "   Params: {:?}", spec.param_sfc)?;
        Ok(())
    }

    /// Retrieval requests before filtering.
    pub fn unfiltered_requests(&self) -> Vec<RetrieveRequest> {
        RequestBuilder::new(&self.config.spec, self.dates.clone())
            .shared_keys(self.config.shared_keys())
            .requests_extra(self.options.requests_extra.clone())
            .build()
    }

    pub fn filter_requests(&self, requests: Vec<RetrieveRequest>) -> Vec<RetrieveRequest> {
        RequestFilter::new(self.options.fields_type, self.config.spec.constant_fields.clone())
            .only_last_date(self.options.only_last_date)
            .apply(requests, &self.dates)
    }

    pub fn print_requests<W: Write>(&self, out: &mut W) -> Result<()> {
        let requests = self.filter_requests(self.unfiltered_requests());
        self.write_requests(out, &requests)
    }

    /// Retrieval requests as pretty JSON or text blocks.
    pub fn write_requests<W: Write>(&self, out: &mut W, requests: &[RetrieveRequest]) -> Result<()> {
        if self.options.json {
            writeln!(out, "{}", render_json_pretty(requests)?)?;
        } else {
            write_pretty(out, "retrieve", requests)?;
        }
        Ok(())
    }

    /// Write the input fields valid at the start of the forecast as step
    /// 0, then a zero field for every accumulated parameter.
    pub fn write_input_fields(&mut self, fields: &FieldSet, accumulations: &[String]) -> Result<usize> {
        let start = start_datetime(fields)?;
        let initial = fields.filter(|f| field_datetime(f) == Some(start));
        let mut written = 0;

        for field in initial.iter() {
            self.write(None, field, Overrides::new().set("step", 0i64))?;
            written += 1;
        }

        if !accumulations.is_empty() {
            let template = initial
                .sel("param", &[MetaValue::from("2t")])
                .first()
                .or_else(|| initial.first())
                .cloned()
                .context("No field to use as accumulation template")?;
            let zeros = vec![0.0; template.values().len()];
            let date = start.format("%Y%m%d").to_string().parse::<i64>()?;
            let time = start.format("%H%M").to_string().parse::<i64>()?;

            for param in accumulations {
                let overrides = Overrides::new()
                    .set("stepType", "accum")
                    .set("param", param.as_str())
                    .set("startStep", 0i64)
                    .set("endStep", 0i64)
                    .set("date", date)
                    .set("time", time)
                    .check(true);
                self.write(Some(&zeros), &template, overrides)?;
                written += 1;
            }
        }

        debug!(count = written, "Wrote step 0");
        Ok(written)
    }
}

fn field_datetime(field: &dyn forecast_common::Field) -> Option<NaiveDateTime> {
    let int = |key: &str| field.metadata(key).and_then(|v| v.as_i64());
    valid_datetime(int("date")?, int("time").unwrap_or(0), int("step").unwrap_or(0)).ok()
}

/// Latest valid date-time among `fields`.
fn start_datetime(fields: &FieldSet) -> Result<NaiveDateTime> {
    fields
        .iter()
        .filter_map(|f| field_datetime(f.as_ref()))
        .max()
        .context("Input fields carry no valid date")
}
