// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Area-based similarity metrics between a detected and a reference perimeter.
//!
//! All metrics derive from a confusion-matrix style partition of the bounding
//! envelope of both shapes:
//!
//! | area        | detected | reference |
//! |-------------|----------|-----------|
//! | true pos.   | inside   | inside    |
//! | false pos.  | inside   | outside   |
//! | false neg.  | outside  | inside    |
//! | true neg.   | outside  | outside   |
//!
//! The envelope stands in for the unbounded complement, so the four areas sum
//! to the envelope area. A zero denominator is always reported as
//! [`Error::DivisionByZero`]; nothing is coerced to zero or infinity.

use crate::{
    Error,
    overlay::{self, GeometrySet},
};
use geo::{Area, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The similarity metrics, in fixed score-table column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Detected area over reference area.
    Ratio,
    /// Agreement (true positive plus true negative) over the envelope area.
    Accuracy,
    /// True positive area over detected area.
    Precision,
    /// True positive area over reference area.
    Recall,
    /// Intersection over union.
    Iou,
    /// Harmonic mean of precision and recall.
    F1,
    /// Symmetric difference area over reference area.
    SymmetricDifferenceRatio,
}

impl Metric {
    /// Every metric in column order.
    pub const ALL: [Metric; 7] = [
        Metric::Ratio,
        Metric::Accuracy,
        Metric::Precision,
        Metric::Recall,
        Metric::Iou,
        Metric::F1,
        Metric::SymmetricDifferenceRatio,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Ratio => "ratio",
            Metric::Accuracy => "accuracy",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::Iou => "iou",
            Metric::F1 => "f1",
            Metric::SymmetricDifferenceRatio => "symmetric_difference_ratio",
        }
    }

    /// Whether a lower value means better agreement.
    ///
    /// Only the symmetric difference ratio is a disagreement measure. The
    /// area ratio is best at 1.0 and has no natural direction.
    pub fn prefers_lower(&self) -> bool {
        matches!(self, Metric::SymmetricDifferenceRatio)
    }

    /// Score one detected geometry against one reference geometry.
    pub fn evaluate(
        &self,
        detected: &MultiPolygon<f64>,
        reference: &MultiPolygon<f64>,
        iou_mode: IouMode,
    ) -> Result<f64, Error> {
        let areas = || ConfusionAreas::compute(detected, reference);
        match self {
            Metric::Ratio => ratio(detected, reference),
            Metric::Accuracy => areas().accuracy(),
            Metric::Precision => areas().precision(),
            Metric::Recall => areas().recall(),
            Metric::Iou => areas().iou(iou_mode),
            Metric::F1 => areas().f1(),
            Metric::SymmetricDifferenceRatio => symmetric_difference_ratio(detected, reference),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ratio" => Ok(Metric::Ratio),
            "accuracy" => Ok(Metric::Accuracy),
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "iou" => Ok(Metric::Iou),
            "f1" => Ok(Metric::F1),
            "symmetric_difference_ratio" | "sym_diff" => Ok(Metric::SymmetricDifferenceRatio),
            other => Err(Error::InvalidParameters(format!("unknown metric '{}'", other))),
        }
    }
}

/// How the IOU column is produced.
///
/// `Overlap` computes intersection over union. `LegacyZero` reproduces the
/// historical scoring output, which reported a constant 0 for every pair, so
/// that old score tables can be regenerated for comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IouMode {
    #[default]
    Overlap,
    LegacyZero,
}

fn divide(numerator: f64, denominator: f64, metric: &'static str) -> Result<f64, Error> {
    if denominator == 0.0 {
        return Err(Error::DivisionByZero { metric });
    }
    Ok(numerator / denominator)
}

/// Partition of the shared envelope into agreement and disagreement areas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfusionAreas {
    pub true_pos: f64,
    pub true_neg: f64,
    pub false_pos: f64,
    pub false_neg: f64,
    /// Area of the envelope of the union of both shapes.
    pub area_total: f64,
    pub detected_area: f64,
    pub reference_area: f64,
}

impl ConfusionAreas {
    pub fn compute(detected: &MultiPolygon<f64>, reference: &MultiPolygon<f64>) -> Self {
        let detected = GeometrySet::from(detected);
        let reference = GeometrySet::from(reference);

        let envelope = overlay::envelope(&overlay::union(&detected, &reference));
        let not_detected = overlay::difference(&envelope, &detected);
        let not_reference = overlay::difference(&envelope, &reference);

        Self {
            true_pos: overlay::area(&overlay::intersection(&detected, &reference)),
            true_neg: overlay::area(&overlay::intersection(&not_detected, &not_reference)),
            false_neg: overlay::area(&overlay::intersection(&not_detected, &reference)),
            false_pos: overlay::area(&overlay::intersection(&not_reference, &detected)),
            area_total: overlay::area(&envelope),
            detected_area: overlay::area(&detected),
            reference_area: overlay::area(&reference),
        }
    }

    pub fn ratio(&self) -> Result<f64, Error> {
        divide(self.detected_area, self.reference_area, "ratio")
    }

    pub fn accuracy(&self) -> Result<f64, Error> {
        divide(self.true_neg + self.true_pos, self.area_total, "accuracy")
    }

    pub fn precision(&self) -> Result<f64, Error> {
        divide(self.true_pos, self.detected_area, "precision")
    }

    pub fn recall(&self) -> Result<f64, Error> {
        divide(self.true_pos, self.reference_area, "recall")
    }

    pub fn iou(&self, mode: IouMode) -> Result<f64, Error> {
        match mode {
            IouMode::Overlap => divide(
                self.true_pos,
                self.true_pos + self.false_pos + self.false_neg,
                "iou",
            ),
            IouMode::LegacyZero => {
                log::warn!("IOU reported as constant 0 (legacy_zero mode)");
                Ok(0.0)
            }
        }
    }

    pub fn f1(&self) -> Result<f64, Error> {
        let precision = self.precision()?;
        let recall = self.recall()?;
        divide(2.0 * precision * recall, precision + recall, "f1")
    }
}

/// Detected area over reference area.
pub fn ratio(detected: &MultiPolygon<f64>, reference: &MultiPolygon<f64>) -> Result<f64, Error> {
    divide(detected.unsigned_area(), reference.unsigned_area(), "ratio")
}

/// Symmetric difference area over reference area.
///
/// A single pair must collapse to at most one symmetric-difference row; more
/// indicates malformed input and is reported as [`Error::InvalidPair`].
pub fn symmetric_difference_ratio(
    detected: &MultiPolygon<f64>,
    reference: &MultiPolygon<f64>,
) -> Result<f64, Error> {
    let detected = GeometrySet::from(detected);
    let reference = GeometrySet::from(reference);
    let sym = overlay::symmetric_difference(&detected, &reference);
    if sym.len() > 1 {
        return Err(Error::InvalidPair { rows: sym.len() });
    }
    divide(
        overlay::area(&sym),
        overlay::area(&reference),
        "symmetric_difference_ratio",
    )
}

/// All seven metrics for one matched pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityScores {
    pub ratio: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub iou: f64,
    pub f1: f64,
    pub symmetric_difference_ratio: f64,
}

impl SimilarityScores {
    /// Compute every metric, sharing one overlay pass for the confusion areas.
    pub fn compute(
        detected: &MultiPolygon<f64>,
        reference: &MultiPolygon<f64>,
        iou_mode: IouMode,
    ) -> Result<Self, Error> {
        let areas = ConfusionAreas::compute(detected, reference);
        Ok(Self {
            ratio: areas.ratio()?,
            accuracy: areas.accuracy()?,
            precision: areas.precision()?,
            recall: areas.recall()?,
            iou: areas.iou(iou_mode)?,
            f1: areas.f1()?,
            symmetric_difference_ratio: symmetric_difference_ratio(detected, reference)?,
        })
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Ratio => self.ratio,
            Metric::Accuracy => self.accuracy,
            Metric::Precision => self.precision,
            Metric::Recall => self.recall,
            Metric::Iou => self.iou,
            Metric::F1 => self.f1,
            Metric::SymmetricDifferenceRatio => self.symmetric_difference_ratio,
        }
    }
}
