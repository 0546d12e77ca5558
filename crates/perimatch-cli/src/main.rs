// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use perimatch::{
    Error, IouMode, Metric, SearchOutcome, Settings, SimplifyMethod, SourceKind, SourceSpec,
    TieBreak, ToleranceSearch, run_match, score_matches,
};
use serde::de::DeserializeOwned;
use std::{path::PathBuf, str::FromStr};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (TOML, YAML or JSON) layered under PERIMATCH_* variables
    #[clap(long, env = "PERIMATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Perimatch Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Print the perimatch version.
    Version,
    /// Match detected perimeters against reference perimeters and score every
    /// matched pair.
    Match {
        /// Detected perimeters (GeoJSON)
        detected: PathBuf,

        /// Reference perimeters (GeoJSON)
        reference: PathBuf,

        /// Maximum days between a detection and its reference
        #[clap(long)]
        day_range: Option<i64>,

        /// Rule for references equally near in time: lowest_index or
        /// first_seen
        #[clap(long)]
        tie_break: Option<String>,

        /// Report a constant 0 in the IOU column
        #[clap(long)]
        legacy_iou: bool,

        /// Match detections on all cores
        #[clap(long)]
        parallel: bool,

        /// Linear unit of the shared CRS, shown in the report
        #[clap(long)]
        unit: Option<String>,

        /// Reference source: reference, wfigs_current, california_all,
        /// inter_agency_history or nifc_history_local
        #[clap(long, default_value = "reference")]
        reference_source: String,

        /// Property holding the detection timestamp
        #[clap(long)]
        detected_time_field: Option<String>,

        /// Property holding the reference timestamp
        #[clap(long)]
        reference_time_field: Option<String>,

        /// Print the score table as JSON instead of the report
        #[clap(long)]
        json: bool,

        /// Also write the score table as an Arrow IPC file
        #[clap(long)]
        arrow: Option<PathBuf>,
    },
    /// Scan simplification tolerances of one detected perimeter for the best
    /// score against one reference perimeter.
    Search {
        /// Detected perimeters (GeoJSON)
        detected: PathBuf,

        /// Reference perimeters (GeoJSON)
        reference: PathBuf,

        /// Index of the detected perimeter
        #[clap(long)]
        detected_index: u64,

        /// Index of the reference perimeter
        #[clap(long)]
        reference_index: u64,

        /// Metric to optimize (ratio, accuracy, precision, recall, iou, f1,
        /// sym_diff)
        #[clap(long, default_value = "iou")]
        metric: String,

        /// Reference source: reference, wfigs_current, california_all,
        /// inter_agency_history or nifc_history_local
        #[clap(long, default_value = "reference")]
        reference_source: String,

        /// Property holding the detection timestamp
        #[clap(long)]
        detected_time_field: Option<String>,

        /// Property holding the reference timestamp
        #[clap(long)]
        reference_time_field: Option<String>,

        /// First (largest) tolerance tested. Squared CRS units (triangle
        /// area) for topology_preserving, CRS units (distance) for
        /// douglas_peucker
        #[clap(long)]
        start: f64,

        /// Decrement between tolerances, in the same unit as --start
        #[clap(long)]
        step: Option<f64>,

        /// Exclusive floor of the scan, in the same unit as --start
        #[clap(long)]
        min: Option<f64>,

        /// Simplification: topology_preserving or douglas_peucker
        #[clap(long)]
        method: Option<String>,

        /// Prefer lower metric values (defaults by metric)
        #[clap(long, conflicts_with = "prefer_higher")]
        prefer_lower: bool,

        /// Prefer higher metric values (defaults by metric)
        #[clap(long)]
        prefer_higher: bool,

        /// Print the outcome and trace as JSON
        #[clap(long)]
        json: bool,
    },
}

/// Parse a snake_case enum value the same way settings files spell it.
fn parse_setting<T: DeserializeOwned>(value: &str) -> Result<T, Error> {
    Ok(serde_json::from_value(serde_json::Value::String(
        value.to_string(),
    ))?)
}

fn source(kind: SourceKind, timestamp_field: Option<String>) -> SourceSpec {
    match timestamp_field {
        Some(field) => kind.spec().with_timestamp_field(field),
        None => kind.spec(),
    }
}

/// Resolve the detected and reference loaders shared by `match` and `search`.
fn sources(
    reference_source: &str,
    detected_time_field: Option<String>,
    reference_time_field: Option<String>,
) -> Result<(SourceSpec, SourceSpec), Error> {
    let reference_kind = parse_setting::<SourceKind>(reference_source)?;
    if reference_kind == SourceKind::Detection {
        return Err(Error::InvalidParameters(
            "detection is not a reference source".to_string(),
        ));
    }
    Ok((
        source(SourceKind::Detection, detected_time_field),
        source(reference_kind, reference_time_field),
    ))
}

// Command handler functions

fn handle_version() -> Result<(), Error> {
    println!("perimatch {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_match(
    mut settings: Settings,
    detected: PathBuf,
    reference: PathBuf,
    day_range: Option<i64>,
    tie_break: Option<String>,
    legacy_iou: bool,
    parallel: bool,
    unit: Option<String>,
    reference_source: String,
    detected_time_field: Option<String>,
    reference_time_field: Option<String>,
    json: bool,
    arrow: Option<PathBuf>,
) -> Result<(), Error> {
    if let Some(day_range) = day_range {
        settings.matching.day_range = day_range;
    }
    if let Some(tie_break) = tie_break {
        settings.matching.tie_break = parse_setting::<TieBreak>(&tie_break)?;
    }
    if legacy_iou {
        settings.matching.iou_mode = IouMode::LegacyZero;
    }
    settings.matching.parallel |= parallel;
    if let Some(unit) = unit {
        settings.unit = unit;
    }

    let (detected_source, reference_source) =
        sources(&reference_source, detected_time_field, reference_time_field)?;
    let detected = detected_source.load_geojson(&detected)?;
    let reference = reference_source.load_geojson(&reference)?;

    let matches = run_match(&detected, &reference, &settings.matching)?;
    let table = score_matches(
        &matches,
        &detected,
        &reference,
        settings.matching.iou_mode,
    )?
    .with_unit(settings.unit);

    if let Some(path) = arrow {
        write_arrow(&table, path)?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        print!("{}", table);
    }
    Ok(())
}

#[cfg(feature = "polars")]
fn write_arrow(table: &perimatch::ScoreTable, path: PathBuf) -> Result<(), Error> {
    table.write_arrow(&path)?;
    log::info!("score table written to {:?}", path);
    Ok(())
}

#[cfg(not(feature = "polars"))]
fn write_arrow(_table: &perimatch::ScoreTable, _path: PathBuf) -> Result<(), Error> {
    Err(Error::InvalidParameters(
        "Arrow output requires the polars feature".to_string(),
    ))
}

#[allow(clippy::too_many_arguments)]
fn handle_search(
    settings: Settings,
    detected: PathBuf,
    reference: PathBuf,
    detected_index: u64,
    reference_index: u64,
    metric: String,
    reference_source: String,
    detected_time_field: Option<String>,
    reference_time_field: Option<String>,
    start: f64,
    step: Option<f64>,
    min: Option<f64>,
    method: Option<String>,
    prefer_lower: bool,
    prefer_higher: bool,
    json: bool,
) -> Result<(), Error> {
    let metric = Metric::from_str(&metric)?;
    let (detected_source, reference_source) =
        sources(&reference_source, detected_time_field, reference_time_field)?;
    let detected = detected_source.load_geojson(&detected)?;
    let reference = reference_source.load_geojson(&reference)?;

    let detected_record = detected
        .get(detected_index)
        .ok_or_else(|| Error::DataQuality {
            index: detected_index,
            reason: "no detected perimeter with this index".to_string(),
        })?;
    let reference_record = reference
        .get(reference_index)
        .ok_or_else(|| Error::DataQuality {
            index: reference_index,
            reason: "no reference perimeter with this index".to_string(),
        })?;

    let prefer_lower = match (prefer_lower, prefer_higher) {
        (true, _) => true,
        (_, true) => false,
        _ => metric.prefers_lower(),
    };

    let mut search = ToleranceSearch::from_config(start, prefer_lower, &settings.search);
    if let Some(step) = step {
        search = search.with_step(step);
    }
    if let Some(min) = min {
        search = search.with_min_tolerance(min);
    }
    if let Some(method) = method {
        search = search.with_method(parse_setting::<SimplifyMethod>(&method)?);
    }

    let outcome = search.search_metric(
        &detected_record.geometry,
        &reference_record.geometry,
        metric,
        settings.matching.iou_mode,
    )?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome_json(metric, &outcome))?
        );
    } else {
        print_outcome(metric, &outcome);
    }
    Ok(())
}

fn outcome_json(metric: Metric, outcome: &SearchOutcome) -> serde_json::Value {
    let trace: Vec<serde_json::Value> = outcome
        .trace
        .iter()
        .map(|step| {
            serde_json::json!({
                "tolerance": step.tolerance,
                "value": step.value,
            })
        })
        .collect();
    serde_json::json!({
        "metric": metric,
        "best_tolerance": outcome.best_tolerance,
        "best_value": outcome.best_value,
        "trace": trace,
    })
}

fn print_outcome(metric: Metric, outcome: &SearchOutcome) {
    println!("Metric: {}", metric);
    println!("Steps: {}", outcome.trace.len());
    match (outcome.best_tolerance, outcome.best_value) {
        (Some(tolerance), Some(value)) => {
            println!("Best tolerance: {}", tolerance);
            println!("Best value: {:.6}", value);
        }
        _ => println!("Best tolerance: none (no step could be scored)"),
    }
}

#[cfg(feature = "profiling")]
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("PERIMATCH_TRACE"))
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        log::warn!("tracing disabled: {}", err);
    }
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    #[cfg(feature = "profiling")]
    init_tracing();

    let args = Args::parse();

    // Version needs no settings
    if args.cmd == Command::Version {
        return handle_version();
    }

    let settings = Settings::load(args.config.as_deref())?;

    match args.cmd {
        Command::Version => handle_version(),
        Command::Match {
            detected,
            reference,
            day_range,
            tie_break,
            legacy_iou,
            parallel,
            unit,
            reference_source,
            detected_time_field,
            reference_time_field,
            json,
            arrow,
        } => handle_match(
            settings,
            detected,
            reference,
            day_range,
            tie_break,
            legacy_iou,
            parallel,
            unit,
            reference_source,
            detected_time_field,
            reference_time_field,
            json,
            arrow,
        ),
        Command::Search {
            detected,
            reference,
            detected_index,
            reference_index,
            metric,
            reference_source,
            detected_time_field,
            reference_time_field,
            start,
            step,
            min,
            method,
            prefer_lower,
            prefer_higher,
            json,
        } => handle_search(
            settings,
            detected,
            reference,
            detected_index,
            reference_index,
            metric,
            reference_source,
            detected_time_field,
            reference_time_field,
            start,
            step,
            min,
            method,
            prefer_lower,
            prefer_higher,
            json,
        ),
    }
}
