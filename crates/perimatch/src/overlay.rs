// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Planar polygon overlay primitives.
//!
//! Every operation works on a [`GeometrySet`], a row-oriented collection of
//! (possibly multi-part) polygons sharing one projected CRS. Areas are planar
//! and in the squared linear unit of that CRS; no reprojection happens here.
//! Empty inputs are valid and produce empty outputs or zero area.

use crate::Error;
use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon};

/// Row-oriented collection of polygonal geometries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometrySet {
    rows: Vec<MultiPolygon<f64>>,
}

impl GeometrySet {
    pub fn new(rows: Vec<MultiPolygon<f64>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[MultiPolygon<f64>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MultiPolygon<f64>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<MultiPolygon<f64>> for GeometrySet {
    fn from(geometry: MultiPolygon<f64>) -> Self {
        Self {
            rows: vec![geometry],
        }
    }
}

impl From<&MultiPolygon<f64>> for GeometrySet {
    fn from(geometry: &MultiPolygon<f64>) -> Self {
        Self {
            rows: vec![geometry.clone()],
        }
    }
}

/// Dissolve rows into a single multi-polygon.
fn dissolve<'a>(rows: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> MultiPolygon<f64> {
    rows.into_iter()
        .fold(MultiPolygon::new(vec![]), |acc, row| acc.union(row))
}

/// True when the bounding rectangles of both geometries overlap.
fn bounds_overlap(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(ra), Some(rb)) => ra.intersects(&rb),
        _ => false,
    }
}

/// Intersect every row of `a` with every row of `b`.
///
/// Pairs whose polygonal intersection is empty (disjoint, or touching only
/// along an edge or at a point) produce no row, so an empty result is a
/// valid "no overlap" answer rather than an error.
pub fn intersection(a: &GeometrySet, b: &GeometrySet) -> GeometrySet {
    let mut rows = Vec::new();
    for left in &a.rows {
        for right in &b.rows {
            if !bounds_overlap(left, right) {
                continue;
            }
            let clipped = left.intersection(right);
            if !clipped.0.is_empty() {
                rows.push(clipped);
            }
        }
    }
    GeometrySet { rows }
}

/// Dissolve both sets into a single covering row.
pub fn union(a: &GeometrySet, b: &GeometrySet) -> GeometrySet {
    GeometrySet::from(dissolve(a.rows.iter().chain(b.rows.iter())))
}

/// Minimum bounding rectangle of each non-empty row.
pub fn envelope(set: &GeometrySet) -> GeometrySet {
    let rows = set
        .rows
        .iter()
        .filter_map(|row| row.bounding_rect())
        .map(|rect| MultiPolygon::new(vec![rect.to_polygon()]))
        .collect();
    GeometrySet { rows }
}

/// Subtract the dissolved `x` from each row of `universe`.
///
/// Rows reduced to nothing are dropped.
pub fn difference(universe: &GeometrySet, x: &GeometrySet) -> GeometrySet {
    let mask = dissolve(x.rows.iter());
    let rows = universe
        .rows
        .iter()
        .map(|row| row.difference(&mask))
        .filter(|row| !row.0.is_empty())
        .collect();
    GeometrySet { rows }
}

/// Union minus intersection of the two sets.
pub fn symmetric_difference(a: &GeometrySet, b: &GeometrySet) -> GeometrySet {
    difference(&union(a, b), &intersection(a, b))
}

/// Sum of the planar area of every part of every row.
pub fn area(set: &GeometrySet) -> f64 {
    set.rows.iter().map(|row| row.unsigned_area()).sum()
}

/// Area of a set that is guaranteed to hold exactly one row.
pub fn single_area(set: &GeometrySet) -> Result<f64, Error> {
    match set.rows.as_slice() {
        [row] => Ok(row.unsigned_area()),
        rows => Err(Error::InvalidParameters(format!(
            "expected a single-row geometry set, found {} rows",
            rows.len()
        ))),
    }
}
