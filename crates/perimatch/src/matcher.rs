// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Spatio-temporal pairing of one detected perimeter to a reference perimeter.
//!
//! Matching runs in three phases:
//!
//! 1. **Spatial**: keep reference records whose polygonal intersection with
//!    the detected geometry is non-empty.
//! 2. **Temporal**: among the survivors, keep the group sharing the smallest
//!    absolute time difference and accept it if it lies within the day-range
//!    window. If the window itself cannot be evaluated the matcher falls back
//!    to accepting every spatial survivor ([`TemporalDecision::Degraded`]).
//! 3. **Flattening**: reduce the accepted group to a single pair using the
//!    configured [`TieBreak`].

use crate::{
    MatchConfig, PolygonCollection, PolygonRecord,
    overlay::{self, GeometrySet},
};
use chrono::{DateTime, TimeDelta, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// One detected polygon paired with its reference polygon, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchPair {
    pub detected_index: u64,
    /// `None` when no reference intersects the detected polygon within the
    /// day-range window.
    pub reference_index: Option<u64>,
}

impl MatchPair {
    pub fn matched(detected_index: u64, reference_index: u64) -> Self {
        Self {
            detected_index,
            reference_index: Some(reference_index),
        }
    }

    pub fn unmatched(detected_index: u64) -> Self {
        Self {
            detected_index,
            reference_index: None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.reference_index.is_some()
    }
}

/// Rule for choosing one reference among several equally near in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Lowest stored reference index.
    #[default]
    LowestIndex,
    /// First candidate in reference collection order.
    FirstSeen,
}

/// Result of the temporal phase for one detected polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum TemporalDecision {
    /// The nearest-date group lies inside the window.
    Accepted {
        references: Vec<u64>,
        delta: TimeDelta,
    },
    /// The nearest-date group lies outside the window.
    Rejected { delta: TimeDelta },
    /// No candidate carried a usable timestamp.
    NoDatedCandidates,
    /// The window could not be evaluated; every spatial survivor is accepted.
    Degraded {
        references: Vec<u64>,
        reason: String,
    },
}

/// Finds the temporally nearest intersecting reference for detected polygons.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalMatcher {
    day_range: i64,
    tie_break: TieBreak,
}

impl Default for TemporalMatcher {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DAY_RANGE)
    }
}

impl TemporalMatcher {
    pub fn new(day_range: i64) -> Self {
        Self {
            day_range,
            tie_break: TieBreak::default(),
        }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        Self {
            day_range: config.day_range,
            tie_break: config.tie_break,
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn day_range(&self) -> i64 {
        self.day_range
    }

    /// The day-range window as a duration.
    fn window(&self) -> Result<TimeDelta, String> {
        if self.day_range < 0 {
            return Err(format!("negative day range {}", self.day_range));
        }
        TimeDelta::try_days(self.day_range)
            .ok_or_else(|| format!("day range {} is not representable", self.day_range))
    }

    /// Spatial phase: reference records overlapping the detected geometry,
    /// in reference collection order.
    pub fn spatial_candidates<'a>(
        &self,
        detected: &PolygonRecord,
        reference: &'a PolygonCollection,
    ) -> Vec<&'a PolygonRecord> {
        let detected_set = GeometrySet::from(&detected.geometry);
        reference
            .iter()
            .filter(|candidate| {
                !overlay::intersection(&GeometrySet::from(&candidate.geometry), &detected_set)
                    .is_empty()
            })
            .collect()
    }

    /// Temporal phase: select the nearest-date group and test it against the
    /// day-range window.
    pub fn temporal_decision(
        &self,
        detected_time: DateTime<Utc>,
        candidates: &[&PolygonRecord],
    ) -> TemporalDecision {
        let dated: Vec<(u64, TimeDelta)> = candidates
            .iter()
            .filter_map(|candidate| match candidate.parsed_timestamp() {
                Ok(t) => Some((candidate.index, (detected_time - t).abs())),
                Err(err) => {
                    log::warn!(
                        "reference {} excluded from temporal matching: {}",
                        candidate.index,
                        err
                    );
                    None
                }
            })
            .collect();

        let Some(nearest) = dated.iter().map(|(_, delta)| *delta).min() else {
            return TemporalDecision::NoDatedCandidates;
        };
        let references: Vec<u64> = dated
            .iter()
            .filter(|(_, delta)| *delta == nearest)
            .map(|(index, _)| *index)
            .collect();

        match self.window() {
            Ok(window) if nearest <= window => TemporalDecision::Accepted {
                references,
                delta: nearest,
            },
            Ok(_) => TemporalDecision::Rejected { delta: nearest },
            Err(reason) => TemporalDecision::Degraded {
                references: candidates.iter().map(|c| c.index).collect(),
                reason,
            },
        }
    }

    /// Flattening phase: reduce an accepted group to exactly one pair.
    ///
    /// `accepted` must be non-empty and in reference collection order.
    pub fn flatten(&self, detected_index: u64, accepted: &[u64]) -> Vec<MatchPair> {
        if accepted.len() > 1 {
            log::warn!(
                "detected {} has {} equally near references [{}], keeping one by {:?}",
                detected_index,
                accepted.len(),
                accepted.iter().join(", "),
                self.tie_break
            );
        }
        let chosen = match self.tie_break {
            TieBreak::LowestIndex => accepted.iter().min().copied(),
            TieBreak::FirstSeen => accepted.first().copied(),
        };
        match chosen {
            Some(reference_index) => vec![MatchPair::matched(detected_index, reference_index)],
            None => vec![MatchPair::unmatched(detected_index)],
        }
    }

    /// Run all three phases for one detected polygon.
    ///
    /// Always returns exactly one pair; no-match conditions are encoded as a
    /// `None` reference index.
    #[cfg_attr(
        feature = "profiling",
        tracing::instrument(skip_all, fields(detected = detected.index))
    )]
    pub fn match_polygon(
        &self,
        detected: &PolygonRecord,
        reference: &PolygonCollection,
    ) -> Vec<MatchPair> {
        let candidates = self.spatial_candidates(detected, reference);
        if candidates.is_empty() {
            log::debug!("detected {}: no intersecting reference", detected.index);
            return vec![MatchPair::unmatched(detected.index)];
        }

        let detected_time = match detected.parsed_timestamp() {
            Ok(t) => t,
            Err(err) => {
                log::warn!("detected {}: {}, leaving unmatched", detected.index, err);
                return vec![MatchPair::unmatched(detected.index)];
            }
        };

        match self.temporal_decision(detected_time, &candidates) {
            TemporalDecision::Accepted { references, delta } => {
                log::debug!(
                    "detected {}: {} reference(s) at {}h",
                    detected.index,
                    references.len(),
                    delta.num_hours()
                );
                self.flatten(detected.index, &references)
            }
            TemporalDecision::Rejected { delta } => {
                log::debug!(
                    "detected {}: nearest reference is {} days away, outside {} day window",
                    detected.index,
                    delta.num_days(),
                    self.day_range
                );
                vec![MatchPair::unmatched(detected.index)]
            }
            TemporalDecision::NoDatedCandidates => {
                log::debug!("detected {}: no reference with a usable date", detected.index);
                vec![MatchPair::unmatched(detected.index)]
            }
            TemporalDecision::Degraded { references, reason } => {
                log::warn!(
                    "detected {}: day-range window unusable ({}), accepting all {} intersecting references",
                    detected.index,
                    reason,
                    references.len()
                );
                self.flatten(detected.index, &references)
            }
        }
    }
}
