// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Whole-collection matching and batch scoring.
//!
//! [`run_match`] pairs every detected record with at most one reference
//! record, and [`score_matches`] turns the resulting [`MatchSet`] into a
//! [`ScoreTable`] with one column per [`Metric`].

use crate::{
    Error, IouMode, MatchConfig, MatchPair, Metric, PolygonCollection, SimilarityScores,
    TemporalMatcher,
};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

/// One pair per detected record, in detected collection order.
pub type MatchSet = Vec<MatchPair>;

/// Match every detected record against the full reference collection.
///
/// Both collections are validated first. The result always holds exactly one
/// pair per detected record, and the pair at position `i` carries the stored
/// index of the record at position `i`.
#[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
pub fn run_match(
    detected: &PolygonCollection,
    reference: &PolygonCollection,
    config: &MatchConfig,
) -> Result<MatchSet, Error> {
    detected.validate()?;
    reference.validate()?;

    let matcher = TemporalMatcher::from_config(config);
    let match_one = |record: &crate::PolygonRecord| -> Result<MatchPair, Error> {
        let pairs = matcher.match_polygon(record, reference);
        if pairs.len() > 1 {
            log::warn!(
                "detected {} produced {} pairs, keeping the first",
                record.index,
                pairs.len()
            );
        }
        let pair = pairs.into_iter().next().ok_or_else(|| {
            Error::InternalConsistency(format!("detected {} produced no pair", record.index))
        })?;
        if pair.detected_index != record.index {
            return Err(Error::InternalConsistency(format!(
                "pair for detected {} carries detected index {}",
                record.index, pair.detected_index
            )));
        }
        Ok(pair)
    };

    let match_set: MatchSet = if config.parallel {
        detected.records().par_iter().map(match_one).collect::<Result<_, _>>()?
    } else {
        detected.iter().map(match_one).collect::<Result<_, _>>()?
    };

    if match_set.len() != detected.len() {
        return Err(Error::InternalConsistency(format!(
            "{} pairs for {} detected records",
            match_set.len(),
            detected.len()
        )));
    }

    log::info!(
        "matched {}/{} detected perimeters against {} references",
        match_set.iter().filter(|p| p.is_matched()).count(),
        match_set.len(),
        reference.len()
    );
    Ok(match_set)
}

/// Score every matched pair.
///
/// Records are looked up by stored index, so the collections may have been
/// filtered or reordered since matching. Unmatched pairs get an all-`None`
/// row. Scoring errors abort the batch.
#[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
pub fn score_matches(
    match_set: &[MatchPair],
    detected: &PolygonCollection,
    reference: &PolygonCollection,
    iou_mode: IouMode,
) -> Result<ScoreTable, Error> {
    let rows = match_set
        .iter()
        .map(|pair| {
            let Some(reference_index) = pair.reference_index else {
                return Ok(None);
            };
            let detected_record =
                detected
                    .get(pair.detected_index)
                    .ok_or_else(|| Error::DataQuality {
                        index: pair.detected_index,
                        reason: "detected index not found in collection".to_string(),
                    })?;
            let reference_record =
                reference
                    .get(reference_index)
                    .ok_or_else(|| Error::DataQuality {
                        index: reference_index,
                        reason: "reference index not found in collection".to_string(),
                    })?;
            SimilarityScores::compute(
                &detected_record.geometry,
                &reference_record.geometry,
                iou_mode,
            )
            .map(Some)
            .inspect_err(|err| {
                log::error!(
                    "scoring detected {} against reference {} failed: {}",
                    pair.detected_index,
                    reference_index,
                    err
                )
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    ScoreTable::assemble(match_set.to_vec(), &rows)
}

/// Values of one metric, aligned to the match set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreColumn {
    pub metric: Metric,
    pub values: Vec<Option<f64>>,
}

/// Per-pair metric columns plus the match set they describe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTable {
    match_set: MatchSet,
    columns: Vec<ScoreColumn>,
    unit: String,
}

impl ScoreTable {
    fn assemble(match_set: MatchSet, rows: &[Option<SimilarityScores>]) -> Result<Self, Error> {
        let columns: Vec<ScoreColumn> = Metric::ALL
            .iter()
            .map(|&metric| ScoreColumn {
                metric,
                values: rows
                    .iter()
                    .map(|row| row.as_ref().map(|scores| scores.get(metric)))
                    .collect(),
            })
            .collect();

        if let Some(column) = columns.iter().find(|c| c.values.len() != match_set.len()) {
            return Err(Error::InternalConsistency(format!(
                "column {} has {} values for {} pairs",
                column.metric,
                column.values.len(),
                match_set.len()
            )));
        }

        Ok(Self {
            match_set,
            columns,
            unit: "meters".to_string(),
        })
    }

    /// Name the linear unit of the CRS for reporting.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn match_set(&self) -> &[MatchPair] {
        &self.match_set
    }

    pub fn columns(&self) -> &[ScoreColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.match_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.match_set.is_empty()
    }

    /// Values of one metric, aligned to [`ScoreTable::match_set`].
    pub fn column(&self, metric: Metric) -> &[Option<f64>] {
        self.columns
            .iter()
            .find(|c| c.metric == metric)
            .map(|c| c.values.as_slice())
            .unwrap_or(&[])
    }

    /// Value of `metric` for the pair at `position`.
    pub fn value(&self, position: usize, metric: Metric) -> Option<f64> {
        self.column(metric).get(position).copied().flatten()
    }

    /// Counts and per-metric means over matched rows.
    pub fn summary(&self) -> MatchSummary {
        let matched = self.match_set.iter().filter(|p| p.is_matched()).count();
        let means = self
            .columns
            .iter()
            .map(|column| {
                let values: Vec<f64> = column.values.iter().flatten().copied().collect();
                let mean = if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                };
                (column.metric, mean)
            })
            .collect();
        MatchSummary {
            total: self.match_set.len(),
            matched,
            unmatched: self.match_set.len() - matched,
            means,
        }
    }

    /// Convert the table to a polars DataFrame, one row per pair.
    ///
    /// Columns: `detected_index`, `reference_index`, then one Float64 column
    /// per metric in [`Metric::ALL`] order. Unmatched rows are null.
    #[cfg(feature = "polars")]
    pub fn to_dataframe(&self) -> Result<polars::prelude::DataFrame, Error> {
        use polars::prelude::*;

        let detected: Vec<u64> = self.match_set.iter().map(|p| p.detected_index).collect();
        let reference: Vec<Option<u64>> =
            self.match_set.iter().map(|p| p.reference_index).collect();

        let mut columns: Vec<Column> = vec![
            Series::new("detected_index".into(), detected).into(),
            Series::new("reference_index".into(), reference).into(),
        ];
        for column in &self.columns {
            columns.push(Series::new(column.metric.name().into(), column.values.clone()).into());
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Write the table as an Arrow IPC file.
    #[cfg(feature = "polars")]
    pub fn write_arrow<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Error> {
        use polars::prelude::*;
        use std::{fs::File, io::BufWriter};

        let mut df = self.to_dataframe()?;
        let file = File::create(path.as_ref())?;
        IpcWriter::new(BufWriter::new(file)).finish(&mut df)?;
        Ok(())
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "-".to_string(),
    }
}

impl fmt::Display for ScoreTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "╔══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(
            f,
            "║                 PERIMETER SIMILARITY REPORT                  ║"
        )?;
        writeln!(
            f,
            "╠══════════════════════════════════════════════════════════════╣"
        )?;
        writeln!(f, "║ Unit:        {}", self.unit)?;
        for (position, pair) in self.match_set.iter().enumerate() {
            let Some(reference_index) = pair.reference_index else {
                continue;
            };
            writeln!(
                f,
                "║ Detected {} ↔ Reference {}",
                pair.detected_index, reference_index
            )?;
            for metric in Metric::ALL {
                writeln!(
                    f,
                    "║   {:<28}{}",
                    metric.name(),
                    format_value(self.value(position, metric))
                )?;
            }
        }
        writeln!(
            f,
            "╠══════════════════════════════════════════════════════════════╣"
        )?;
        write!(f, "{}", self.summary())?;
        writeln!(
            f,
            "╚══════════════════════════════════════════════════════════════╝"
        )?;
        Ok(())
    }
}

/// Aggregate view of a score table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Mean of each metric over matched pairs, `None` when nothing matched.
    pub means: Vec<(Metric, Option<f64>)>,
}

impl MatchSummary {
    /// Fraction of detected perimeters with a reference match.
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

impl fmt::Display for MatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "║ Matched:     {}/{} ({:.1}%), unmatched: {}",
            self.matched,
            self.total,
            self.match_rate() * 100.0,
            self.unmatched
        )?;
        for (metric, mean) in &self.means {
            writeln!(f, "║   mean {:<23}{}", metric.name(), format_value(*mean))?;
        }
        Ok(())
    }
}
