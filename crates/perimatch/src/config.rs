// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Layered run configuration.
//!
//! Values are resolved from built-in defaults, then an optional TOML (or any
//! format supported by the `config` crate) file, then `PERIMATCH_*`
//! environment variables using `__` to separate nested keys:
//!
//! ```text
//! PERIMATCH_MATCHING__DAY_RANGE=10
//! PERIMATCH_MATCHING__TIE_BREAK=first_seen
//! PERIMATCH_SEARCH__STEP=0.0005
//! PERIMATCH_UNIT=feet
//! ```

use crate::{Error, IouMode, SimplifyMethod, TieBreak};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default day-range window between detected and reference timestamps.
pub const DEFAULT_DAY_RANGE: i64 = 7;

/// Default decrement between tested simplification tolerances.
pub const DEFAULT_STEP: f64 = 0.001;

/// Default floor of the tolerance scan (exclusive).
pub const DEFAULT_MIN_TOLERANCE: f64 = 0.001;

/// Default upper bound on evaluated tolerance steps.
pub const DEFAULT_MAX_STEPS: usize = 100_000;

/// Matching and scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Maximum allowed distance in days between a detected polygon and its
    /// nearest reference polygon.
    pub day_range: i64,
    /// Rule choosing one reference when several tie for the nearest date.
    pub tie_break: TieBreak,
    /// How the IOU column is produced.
    pub iou_mode: IouMode,
    /// Match detected polygons on the rayon thread pool.
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            day_range: DEFAULT_DAY_RANGE,
            tie_break: TieBreak::default(),
            iou_mode: IouMode::default(),
            parallel: false,
        }
    }
}

/// Tolerance search parameters that are not specific to a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub step: f64,
    pub min_tolerance: f64,
    pub max_steps: usize,
    pub method: SimplifyMethod,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            min_tolerance: DEFAULT_MIN_TOLERANCE,
            max_steps: DEFAULT_MAX_STEPS,
            method: SimplifyMethod::default(),
        }
    }
}

/// Complete run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub matching: MatchConfig,
    pub search: SearchConfig,
    /// Linear unit of the shared planar CRS, shown in reports.
    pub unit: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            matching: MatchConfig::default(),
            search: SearchConfig::default(),
            unit: "meters".to_string(),
        }
    }
}

impl Settings {
    /// Resolve settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            log::debug!("loading settings from {:?}", path);
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("PERIMATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    /// Reject values no run could use.
    pub fn check(&self) -> Result<(), Error> {
        if !(self.search.step.is_finite() && self.search.step > 0.0) {
            return Err(Error::InvalidParameters(format!(
                "search.step must be a positive number, got {}",
                self.search.step
            )));
        }
        if !self.search.min_tolerance.is_finite() {
            return Err(Error::InvalidParameters(
                "search.min_tolerance must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.matching.day_range, 7);
        assert_eq!(settings.matching.tie_break, TieBreak::LowestIndex);
        assert_eq!(settings.matching.iou_mode, IouMode::Overlap);
        assert_eq!(settings.search.step, 0.001);
        assert_eq!(settings.search.min_tolerance, 0.001);
        assert_eq!(settings.unit, "meters");
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "unit = \"feet\"\n\n[matching]\nday_range = 3\ntie_break = \"first_seen\"\niou_mode = \"legacy_zero\"\n\n[search]\nstep = 0.5\nmethod = \"douglas_peucker\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.unit, "feet");
        assert_eq!(settings.matching.day_range, 3);
        assert_eq!(settings.matching.tie_break, TieBreak::FirstSeen);
        assert_eq!(settings.matching.iou_mode, IouMode::LegacyZero);
        assert!(!settings.matching.parallel);
        assert_eq!(settings.search.step, 0.5);
        assert_eq!(settings.search.method, SimplifyMethod::DouglasPeucker);
        assert_eq!(settings.search.min_tolerance, DEFAULT_MIN_TOLERANCE);
    }

    #[test]
    fn test_rejects_non_positive_step() {
        let mut settings = Settings::default();
        settings.search.step = 0.0;
        assert!(matches!(settings.check(), Err(Error::InvalidParameters(_))));
    }
}
