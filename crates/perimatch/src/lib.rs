// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Perimatch
//!
//! Perimatch pairs satellite-derived fire perimeters with agency-surveyed
//! reference perimeters and scores how well each detected shape agrees with
//! its reference. It provides:
//!
//! - **Overlay primitives**: planar intersection, union, difference,
//!   symmetric difference and bounding envelopes over polygon rows
//! - **Similarity metrics**: ratio, accuracy, precision, recall, IOU, F1 and
//!   symmetric-difference ratio computed from confusion areas
//! - **Temporal matching**: each detected polygon is paired with the spatially
//!   intersecting reference whose timestamp is nearest within a day window
//! - **Score tables**: per-pair metrics with a summary report, exportable as a
//!   Polars `DataFrame` or Arrow IPC file
//! - **Tolerance search**: a linear scan of simplification tolerances for the
//!   best-scoring simplified detection
//!
//! All geometries must already share one projected CRS; areas are reported in
//! its squared linear unit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use perimatch::{Error, MatchConfig, SourceKind, run_match, score_matches};
//!
//! fn main() -> Result<(), Error> {
//!     let detected = SourceKind::Detection.spec().load_geojson("detections.geojson")?;
//!     let reference = SourceKind::Reference.spec().load_geojson("reference.geojson")?;
//!
//!     let config = MatchConfig::default();
//!     let matches = run_match(&detected, &reference, &config)?;
//!     let table = score_matches(&matches, &detected, &reference, config.iou_mode)?;
//!
//!     println!("{}", table);
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `polars` (default): `ScoreTable::to_dataframe` and Arrow IPC export
//! - `profiling`: `tracing` spans around matching and tolerance search

mod collection;
pub mod config;
mod error;
mod matcher;
mod metrics;
mod orchestrator;
pub mod overlay;
mod search;
mod source;

#[cfg(feature = "profiling")]
pub mod instrument;

pub use crate::{
    collection::{PolygonCollection, PolygonRecord, parse_timestamp},
    config::{MatchConfig, SearchConfig, Settings},
    error::Error,
    matcher::{MatchPair, TemporalDecision, TemporalMatcher, TieBreak},
    metrics::{
        ConfusionAreas, IouMode, Metric, SimilarityScores, ratio, symmetric_difference_ratio,
    },
    orchestrator::{MatchSet, MatchSummary, ScoreColumn, ScoreTable, run_match, score_matches},
    search::{SearchOutcome, SimplifyMethod, ToleranceSearch, TraceStep, simplify},
    source::{SourceKind, SourceSpec},
};

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }
}
