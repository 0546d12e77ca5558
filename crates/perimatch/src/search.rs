// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Linear scan of simplification tolerances for the best-scoring shape.
//!
//! The detected geometry is simplified at `start, start - step, ...` while the
//! tolerance stays strictly above the floor, and each simplified shape is
//! scored against the reference. The metric surface is not assumed to be
//! monotonic or unimodal, so every step is evaluated.

use crate::{Error, IouMode, Metric, SearchConfig};
use geo::{MultiPolygon, Simplify, SimplifyVwPreserve};
use serde::{Deserialize, Serialize};

/// Simplification algorithm applied to the detected geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplifyMethod {
    /// Visvalingam-Whyatt that never introduces self-intersections. The
    /// tolerance is a triangle area in squared CRS units.
    #[default]
    TopologyPreserving,
    /// Ramer-Douglas-Peucker. The tolerance is a distance in CRS units and
    /// the output may self-intersect.
    DouglasPeucker,
}

/// Simplify a geometry with the given tolerance.
///
/// A tolerance of zero leaves the covered area unchanged.
pub fn simplify(
    geometry: &MultiPolygon<f64>,
    tolerance: f64,
    method: SimplifyMethod,
) -> MultiPolygon<f64> {
    match method {
        SimplifyMethod::TopologyPreserving => geometry.simplify_vw_preserve(&tolerance),
        SimplifyMethod::DouglasPeucker => geometry.simplify(&tolerance),
    }
}

/// One evaluated tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub tolerance: f64,
    pub geometry: MultiPolygon<f64>,
    /// Metric value, `NaN` when the simplified shape could not be scored.
    pub value: f64,
}

/// Best tolerance and the full per-step trace.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// `None` only if no step produced a finite score.
    pub best_tolerance: Option<f64>,
    pub best_value: Option<f64>,
    /// Steps in evaluation order (decreasing tolerance).
    pub trace: Vec<TraceStep>,
}

/// Parameters of a tolerance scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceSearch {
    start: f64,
    step: f64,
    min_tolerance: f64,
    prefer_lower: bool,
    method: SimplifyMethod,
    max_steps: usize,
}

impl ToleranceSearch {
    pub fn new(start: f64, prefer_lower: bool) -> Self {
        Self::from_config(start, prefer_lower, &SearchConfig::default())
    }

    pub fn from_config(start: f64, prefer_lower: bool, config: &SearchConfig) -> Self {
        Self {
            start,
            step: config.step,
            min_tolerance: config.min_tolerance,
            prefer_lower,
            method: config.method,
            max_steps: config.max_steps,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_min_tolerance(mut self, min_tolerance: f64) -> Self {
        self.min_tolerance = min_tolerance;
        self
    }

    pub fn with_method(mut self, method: SimplifyMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate parameters and return the number of steps the scan evaluates.
    fn step_count(&self) -> Result<usize, Error> {
        if !(self.start.is_finite() && self.step.is_finite() && self.min_tolerance.is_finite()) {
            return Err(Error::InvalidParameters(
                "tolerance search parameters must be finite".to_string(),
            ));
        }
        if self.step <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "tolerance step must be positive, got {}",
                self.step
            )));
        }
        if self.start <= self.min_tolerance {
            return Err(Error::InvalidParameters(format!(
                "start tolerance {} must exceed minimum tolerance {}",
                self.start, self.min_tolerance
            )));
        }

        // Absorb rounding so a tolerance landing on the floor is excluded.
        let floor = self.min_tolerance + self.step * 1e-9;
        let estimate = ((self.start - floor) / self.step).ceil();
        if estimate > self.max_steps as f64 {
            return Err(Error::InvalidParameters(format!(
                "tolerance search would take {} steps, limit is {}",
                estimate, self.max_steps
            )));
        }
        Ok((0..=estimate as usize)
            .take_while(|&k| self.start - k as f64 * self.step > floor)
            .count())
    }

    /// Scan tolerances, scoring each simplified `detected` against `reference`.
    ///
    /// The best score uses strict comparison, so the first (largest)
    /// tolerance wins ties. A step whose score divides by zero is kept in the
    /// trace with a `NaN` value; any other error aborts the scan.
    #[cfg_attr(feature = "profiling", tracing::instrument(skip_all))]
    pub fn search<F>(
        &self,
        detected: &MultiPolygon<f64>,
        reference: &MultiPolygon<f64>,
        mut metric: F,
    ) -> Result<SearchOutcome, Error>
    where
        F: FnMut(&MultiPolygon<f64>, &MultiPolygon<f64>) -> Result<f64, Error>,
    {
        let steps = self.step_count()?;
        let mut trace = Vec::with_capacity(steps);
        let mut best: Option<(f64, f64)> = None;

        for k in 0..steps {
            let tolerance = self.start - k as f64 * self.step;
            #[cfg(feature = "profiling")]
            let _span = crate::instrument::trace_span!("tolerance_step", k, tolerance).entered();
            let simplified = simplify(detected, tolerance, self.method);

            let value = match metric(&simplified, reference) {
                Ok(value) => value,
                Err(Error::DivisionByZero { metric: name }) => {
                    log::warn!(
                        "tolerance {}: simplified shape cannot be scored ({} divides by zero)",
                        tolerance,
                        name
                    );
                    f64::NAN
                }
                Err(err) => return Err(err),
            };

            let improves = match best {
                _ if value.is_nan() => false,
                None => true,
                Some((_, current)) if self.prefer_lower => value < current,
                Some((_, current)) => value > current,
            };
            if improves {
                best = Some((tolerance, value));
            }

            trace.push(TraceStep {
                tolerance,
                geometry: simplified,
                value,
            });
        }

        log::debug!(
            "tolerance search evaluated {} steps, best {:?}",
            trace.len(),
            best
        );

        Ok(SearchOutcome {
            best_tolerance: best.map(|(tolerance, _)| tolerance),
            best_value: best.map(|(_, value)| value),
            trace,
        })
    }

    /// Scan tolerances using one of the built-in metrics.
    pub fn search_metric(
        &self,
        detected: &MultiPolygon<f64>,
        reference: &MultiPolygon<f64>,
        metric: Metric,
        iou_mode: IouMode,
    ) -> Result<SearchOutcome, Error> {
        self.search(detected, reference, |simplified, reference| {
            metric.evaluate(simplified, reference, iou_mode)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Coord, LineString, Polygon, polygon};

    /// Regular polygon approximating a circle, many vertices to simplify away.
    fn circle(radius: f64, vertices: usize) -> MultiPolygon<f64> {
        let ring: Vec<Coord<f64>> = (0..vertices)
            .map(|i| {
                let angle = std::f64::consts::TAU * i as f64 / vertices as f64;
                Coord {
                    x: radius * angle.cos(),
                    y: radius * angle.sin(),
                }
            })
            .collect();
        Polygon::new(LineString::from(ring), vec![]).into()
    }

    fn with_collinear_points() -> MultiPolygon<f64> {
        polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 5.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]
        .into()
    }

    #[test]
    fn test_zero_tolerance_preserves_area() {
        for shape in [circle(10.0, 64), with_collinear_points()] {
            for method in [SimplifyMethod::TopologyPreserving, SimplifyMethod::DouglasPeucker] {
                let simplified = simplify(&shape, 0.0, method);
                assert!((simplified.unsigned_area() - shape.unsigned_area()).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_step_count_excludes_floor() {
        let search = ToleranceSearch::new(0.01, true);
        assert_eq!(search.step_count().unwrap(), 9);

        let search = ToleranceSearch::new(1.0, true).with_step(0.25).with_min_tolerance(0.0);
        assert_eq!(search.step_count().unwrap(), 4);
    }

    #[test]
    fn test_invalid_parameters() {
        let shape = circle(1.0, 8);
        let metric = |_: &MultiPolygon<f64>, _: &MultiPolygon<f64>| Ok(0.0);

        let bad_step = ToleranceSearch::new(1.0, true).with_step(0.0);
        assert!(matches!(
            bad_step.search(&shape, &shape, metric),
            Err(Error::InvalidParameters(_))
        ));

        let below_floor = ToleranceSearch::new(0.001, true);
        assert!(matches!(
            below_floor.search(&shape, &shape, metric),
            Err(Error::InvalidParameters(_))
        ));

        let unbounded = ToleranceSearch::new(1_000.0, true).with_max_steps(10);
        assert!(matches!(
            unbounded.search(&shape, &shape, metric),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_monotonic_metric_picks_extreme_tolerance() {
        let shape = circle(5.0, 16);
        // Calls arrive in decreasing tolerance order, so this metric grows
        // with tolerance.
        let increasing_with_tolerance = || {
            let mut calls = 0.0;
            move |_: &MultiPolygon<f64>, _: &MultiPolygon<f64>| {
                calls += 1.0;
                Ok(100.0 - calls)
            }
        };

        let lower = ToleranceSearch::new(0.01, true)
            .search(&shape, &shape, increasing_with_tolerance())
            .unwrap();
        let smallest = lower.trace.last().unwrap().tolerance;
        assert_eq!(lower.best_tolerance, Some(smallest));
        assert!((smallest - 0.002).abs() < 1e-12);

        let higher = ToleranceSearch::new(0.01, false)
            .search(&shape, &shape, increasing_with_tolerance())
            .unwrap();
        assert_eq!(higher.best_tolerance, Some(0.01));
        assert_eq!(higher.best_value, Some(99.0));
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let shape = circle(5.0, 16);
        let outcome = ToleranceSearch::new(0.01, true)
            .search(&shape, &shape, |_, _| Ok(1.0))
            .unwrap();
        assert_eq!(outcome.best_tolerance, Some(0.01));
        assert_eq!(outcome.trace.len(), 9);
    }

    #[test]
    fn test_symmetric_difference_search_against_original() {
        let detected = circle(100.0, 360);
        let reference = detected.clone();
        let outcome = ToleranceSearch::new(50.0, true)
            .with_step(5.0)
            .with_min_tolerance(0.0)
            .search_metric(
                &detected,
                &reference,
                Metric::SymmetricDifferenceRatio,
                IouMode::Overlap,
            )
            .unwrap();

        assert_eq!(outcome.trace.len(), 10);
        let best = outcome.best_value.unwrap();
        let min_in_trace = outcome
            .trace
            .iter()
            .map(|step| step.value)
            .filter(|v| !v.is_nan())
            .fold(f64::INFINITY, f64::min);
        assert_eq!(best, min_in_trace);
        for step in &outcome.trace {
            assert!(step.geometry.unsigned_area() <= detected.unsigned_area() + 1e-6);
        }
    }

    #[test]
    fn test_unscorable_steps_are_recorded_as_nan() {
        let shape = circle(5.0, 16);
        let outcome = ToleranceSearch::new(0.01, false)
            .search(&shape, &shape, |_, _| {
                Err(Error::DivisionByZero { metric: "precision" })
            })
            .unwrap();
        assert_eq!(outcome.best_tolerance, None);
        assert!(outcome.trace.iter().all(|step| step.value.is_nan()));
    }
}
