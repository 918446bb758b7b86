//! Forecast model runner.
//!
//! Prepares the input of a forecast model and writes its results:
//! - Prints the fields and retrieval requests a model needs
//! - Reads input fields from a local file and writes them as step 0
//! - Runs the model on a remote inference server
//! - Relabels hindcast output and records archive requests

mod config;
mod model;
mod remote;
mod source;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use field_pipeline::{default_cache_dir, FileConstantsStore, RequestBasedInput};
use forecast_common::time::{datetimes, expand_lags, parse_date_arg, parse_staging_dates};
use forecast_common::{MetaValue, Metadata, RetrieveRequest, RunDateTime};
use mars_requests::{parse_requests_extra, FieldsType, DEFAULT_TARGET};
use model_output::{
    FieldOutput, FileOutput, FileOutputConfig, HindcastRelabel, JsonLinesEncoder, NoneOutput,
    ReferenceDate,
};
use serde_json::json;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::ModelConfig;
use model::{Model, RequestOptions};
use remote::Remote;
use source::{FileSource, JsonLinesDecoder};

#[derive(Parser, Debug)]
#[command(name = "ai-runner")]
#[command(about = "Prepare, run and archive forecast models")]
struct Args {
    /// The model to run
    model: Option<String>,

    /// List models and exit
    #[arg(long)]
    models: bool,

    /// Configuration directory (contains models/*.yaml)
    #[arg(long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Model configuration file (default: <config-dir>/models/<model>.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the fields needed as input for the model
    #[arg(long)]
    fields: bool,

    /// Print retrieval requests to stdout
    #[arg(long)]
    retrieve_requests: bool,

    /// Save archive requests to FILE
    #[arg(long, value_name = "FILE")]
    archive_requests: Option<PathBuf>,

    /// Extend or override the requests with key1=value1,key2=value2
    #[arg(long)]
    requests_extra: Option<String>,

    /// Dump the requests in JSON format
    #[arg(long)]
    json: bool,

    /// Type of field to retrieve (all, constants, prognostics)
    #[arg(long, default_value = "all")]
    retrieve_fields_type: FieldsType,

    /// Only retrieve the last date/time
    #[arg(long)]
    retrieve_only_one_date: bool,

    /// Analysis date to start from: YYYYMMDD, YYYY-MM-DD or days relative to today
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    date: String,

    /// Analysis time to start from
    #[arg(long, default_value = "12")]
    time: i64,

    /// File with one start date per line, used instead of --date/--time
    #[arg(long)]
    staging_dates: Option<PathBuf>,

    /// Input fields file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Where to write the results; may contain {key} placeholders
    #[arg(long)]
    path: Option<String>,

    /// Where to output the results (file, none)
    #[arg(long, default_value = "file")]
    output: String,

    /// Experiment version of the output; has priority over --metadata
    #[arg(long)]
    expver: Option<String>,

    /// `class` of the output; has priority over --metadata
    #[arg(long = "class")]
    class: Option<String>,

    /// Additional output metadata as KEY=VALUE
    #[arg(long, value_name = "KEY=VALUE")]
    metadata: Vec<String>,

    /// Length of forecast in hours
    #[arg(long, default_value = "240")]
    lead_time: i64,

    /// Reference year for hindcast-like output
    #[arg(long)]
    hindcast_reference_year: Option<i64>,

    /// Reference date for hindcast-like output
    #[arg(long)]
    hindcast_reference_date: Option<i64>,

    /// Run on the remote server
    #[arg(long, env = "AI_MODELS_REMOTE", value_parser = clap::builder::BoolishValueParser::new())]
    remote: bool,

    /// Remote server URL
    #[arg(long)]
    remote_url: Option<String>,

    /// Model version
    #[arg(long, default_value = "latest")]
    model_version: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log as JSON
    #[arg(long)]
    log_json: bool,

    /// Turn on debug
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.requests_extra.is_some() && !args.retrieve_requests && args.archive_requests.is_none() {
        Args::command()
            .error(
                clap::error::ErrorKind::ArgumentConflict,
                "You need to specify --retrieve-requests or --archive-requests",
            )
            .exit();
    }

    init_tracing(&args)?;

    if args.models {
        return list_models(&args).await;
    }

    let Some(name) = args.model.clone() else {
        bail!("No model given. Use --models to list the available models.");
    };

    let remote = if args.remote {
        Some(Remote::connect(args.remote_url.clone(), &name, &args.model_version)?)
    } else {
        None
    };

    let config = match &remote {
        Some(remote) => remote.model_config().await?,
        None => ModelConfig::load(&config_path(&args, &name))?,
    };

    let dates = run_dates(&args, &config)?;
    let requests_extra = match &args.requests_extra {
        Some(text) => parse_requests_extra(text)?,
        None => RetrieveRequest::new(),
    };

    let output = build_output(&args, &name, &config)?;
    let options = RequestOptions {
        archive_requests: args.archive_requests.clone(),
        requests_extra,
        json: args.json,
        fields_type: args.retrieve_fields_type,
        only_last_date: args.retrieve_only_one_date,
    };
    let mut model = Model::new(&name, config, dates, output, options);
    let job_config = job_config(&args, &model);

    if args.fields {
        model.print_fields(&mut io::stdout().lock())?;
        return Ok(());
    }

    if args.retrieve_requests || (args.requests_extra.is_some() && args.archive_requests.is_none()) {
        let mut requests = model.unfiltered_requests();
        if let Some(remote) = remote.as_ref().filter(|_| model.config.remote_has_patch) {
            requests = remote.patch_requests(&job_config, requests).await?;
        }
        let requests = model.filter_requests(requests);
        model.write_requests(&mut io::stdout().lock(), &requests)?;
        return Ok(());
    }

    let Some(file) = &args.file else {
        bail!("No input fields. Use --file to read them from a file.");
    };
    let source = Arc::new(FileSource::open(file, &JsonLinesDecoder)?);
    let mut input = RequestBasedInput::new(source, model.config.spec.clone(), model.dates.clone());
    if let Ok(cache_dir) = default_cache_dir() {
        input = input.with_constants(Arc::new(FileConstantsStore::new(cache_dir, Arc::new(JsonLinesDecoder))));
    }
    if let Some(remote) = remote.as_ref().filter(|_| model.config.remote_has_patch) {
        let patch = remote.server_patch(&job_config, input.requests()).await?;
        input = input.with_patch(Arc::new(patch));
    }
    let fields = input.all_fields()?;

    match &remote {
        Some(remote) => {
            let count = remote.run(&mut model, &fields, &job_config).await?;
            info!(count, "Remote run complete");
        }
        None => {
            let accumulations = model.config.accumulations.clone();
            let count = model.write_input_fields(&fields, &accumulations)?;
            info!(count, "Wrote input fields");
        }
    }

    model.finalise()
}

fn init_tracing(args: &Args) -> Result<()> {
    let level = if args.debug {
        Level::DEBUG
    } else {
        match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(io::stderr);

    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn list_models(args: &Args) -> Result<()> {
    let models = if args.remote {
        let name = args.model.as_deref().unwrap_or_default();
        Remote::connect(args.remote_url.clone(), name, &args.model_version)?
            .api()
            .models()
            .await?
    } else {
        local_models(&args.config_dir.join("models"))?
    };
    for model in models {
        println!("{}", model);
    }
    Ok(())
}

/// Model names from the `*.yaml` files of a directory, sorted.
fn local_models(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read model directory: {}", dir.display()))?;
    let mut models = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                models.push(stem.to_string());
            }
        }
    }
    models.sort();
    Ok(models)
}

fn config_path(args: &Args, name: &str) -> PathBuf {
    args.config
        .clone()
        .unwrap_or_else(|| args.config_dir.join("models").join(format!("{}.yaml", name)))
}

/// Start date-times of the run, expanded by the model's lags.
fn run_dates(args: &Args, config: &ModelConfig) -> Result<Vec<RunDateTime>> {
    let lags = &config.spec.lagged;
    match &args.staging_dates {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read staging dates: {}", path.display()))?;
            let bases = parse_staging_dates(&text)?;
            if bases.is_empty() {
                bail!("No dates in {}", path.display());
            }
            Ok(expand_lags(&bases, lags))
        }
        None => Ok(datetimes(parse_date_arg(&args.date)?, args.time, lags, 0)?),
    }
}

/// `--metadata` pairs, then `--expver` and `--class` on top.
fn output_metadata(args: &Args) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in &args.metadata {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid metadata '{}', expected KEY=VALUE", pair);
        };
        metadata.insert(key.trim().to_string(), MetaValue::from(value.trim()));
    }
    if let Some(expver) = &args.expver {
        metadata.insert("expver".to_string(), MetaValue::from(expver.as_str()));
    }
    if let Some(class) = &args.class {
        metadata.insert("class".to_string(), MetaValue::from(class.as_str()));
    }
    Ok(metadata)
}

fn build_output(args: &Args, name: &str, config: &ModelConfig) -> Result<Box<dyn FieldOutput>> {
    let output: Box<dyn FieldOutput> = match args.output.as_str() {
        "file" => {
            let mut file_config = FileOutputConfig::new(
                args.path.clone().unwrap_or_else(|| format!("{}.jsonl", name)),
            );
            file_config.metadata = output_metadata(args)?;
            file_config.expver = config.expver.clone();
            file_config.version = config.version;
            Box::new(FileOutput::new(file_config, JsonLinesEncoder)?)
        }
        "none" => Box::new(NoneOutput::new()),
        other => bail!("Unknown output '{}', expected file or none", other),
    };

    if args.hindcast_reference_year.is_none() && args.hindcast_reference_date.is_none() {
        return Ok(output);
    }
    let reference = ReferenceDate::from_options(args.hindcast_reference_year, args.hindcast_reference_date)?;
    info!(reference = ?reference, "Writing hindcast output");
    Ok(Box::new(HindcastRelabel::new(output, reference)))
}

/// Job configuration sent to the remote server.
fn job_config(args: &Args, model: &Model) -> serde_json::Value {
    let start = model.dates.last().copied();
    if start.is_none() {
        warn!("Run has no dates");
    }
    json!({
        "model": model.name,
        "version": args.model_version,
        "date": start.map(|d| d.date),
        "time": start.map(|d| d.time),
        "lead_time": args.lead_time,
        "expver": model.config.expver,
        "metadata": args.metadata,
        "target": DEFAULT_TARGET,
    })
}
