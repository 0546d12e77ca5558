// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! GeoJSON loading of perimeter collections.
//!
//! Each perimeter source is one variant of the closed [`SourceKind`]
//! enumeration and resolves to a [`SourceSpec`] describing where the
//! timestamp and index live in its feature properties and which extra
//! filters it needs. Loading applies the filtering stage that guarantees the
//! core's preconditions: features without a valid polygonal geometry or a
//! timestamp are dropped with a warning.
//!
//! Timestamps are normalized while loading. String values are kept as is and
//! left to [`crate::parse_timestamp`]; numeric values are epoch milliseconds
//! (the ArcGIS encoding) and are stored as RFC 3339.
//!
//! Geometries must already share one projected CRS; no reprojection is done.

use crate::{Error, PolygonCollection, PolygonRecord};
use chrono::{DateTime, SecondsFormat};
use geo::{
    Area, Geometry, LineIntersection, LineString, MultiPolygon,
    line_intersection::line_intersection,
};
use geojson::{Feature, GeoJson};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// The perimeter sources understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Near-real-time satellite detection product.
    Detection,
    /// Custom reference set already carrying a normalized `DATE_CUR_STAMP`.
    Reference,
    /// `WFIGS_current_interagency_fire_perimeters` (ArcGIS Online).
    WfigsCurrent,
    /// `california_fire_perimeters_all` (ArcGIS Online).
    CaliforniaAll,
    /// `InterAgencyFirePerimeterHistory_All_Years_View` (ArcGIS Online).
    InterAgencyHistory,
    /// NIFC interagency history exported locally, `DATE_CUR` as `YYYYMMDD`.
    NifcHistoryLocal,
}

impl SourceKind {
    pub const ALL: [SourceKind; 6] = [
        SourceKind::Detection,
        SourceKind::Reference,
        SourceKind::WfigsCurrent,
        SourceKind::CaliforniaAll,
        SourceKind::InterAgencyHistory,
        SourceKind::NifcHistoryLocal,
    ];

    /// Default property holding the observation time.
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            SourceKind::Detection => "t",
            SourceKind::Reference => "DATE_CUR_STAMP",
            SourceKind::WfigsCurrent | SourceKind::InterAgencyHistory => "poly_PolygonDateTime",
            SourceKind::CaliforniaAll => "ALARM_DATE",
            SourceKind::NifcHistoryLocal => "DATE_CUR",
        }
    }

    /// Acreage property whose zero value marks a placeholder perimeter.
    pub fn acreage_field(&self) -> Option<&'static str> {
        match self {
            SourceKind::NifcHistoryLocal => Some("GIS_ACRES"),
            _ => None,
        }
    }

    /// Upstream dataset title, for the published agency sources.
    pub fn dataset_title(&self) -> Option<&'static str> {
        match self {
            SourceKind::WfigsCurrent => Some("WFIGS_current_interagency_fire_perimeters"),
            SourceKind::CaliforniaAll => Some("california_fire_perimeters_all"),
            SourceKind::InterAgencyHistory => {
                Some("InterAgencyFirePerimeterHistory_All_Years_View")
            }
            SourceKind::Detection | SourceKind::Reference | SourceKind::NifcHistoryLocal => None,
        }
    }

    pub fn spec(self) -> SourceSpec {
        SourceSpec::new(self)
    }
}

/// Property layout of one source, resolved when the loader is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub kind: SourceKind,
    /// Property normalized into [`PolygonRecord::timestamp`].
    pub timestamp_field: String,
    /// Property holding the stable index; feature position is used when
    /// absent.
    pub index_field: String,
    /// Features whose value here is exactly zero are dropped.
    pub acreage_field: Option<String>,
}

impl SourceSpec {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            timestamp_field: kind.timestamp_field().to_string(),
            index_field: "index".to_string(),
            acreage_field: kind.acreage_field().map(str::to_string),
        }
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn with_index_field(mut self, field: impl Into<String>) -> Self {
        self.index_field = field.into();
        self
    }

    /// Read a GeoJSON file holding a `FeatureCollection` or a single `Feature`.
    pub fn load_geojson<P: AsRef<Path>>(&self, path: P) -> Result<PolygonCollection, Error> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loading {:?} perimeters from {:?}", self.kind, path.as_ref());
        self.read_geojson(&text)
    }

    /// Parse GeoJSON text holding a `FeatureCollection` or a single `Feature`.
    pub fn read_geojson(&self, text: &str) -> Result<PolygonCollection, Error> {
        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(Error::InvalidParameters(
                    "expected a GeoJSON Feature or FeatureCollection, found a bare Geometry"
                        .to_string(),
                ));
            }
        };

        let total = features.len();
        let records = features
            .into_iter()
            .enumerate()
            .map(|(position, feature)| self.record_from_feature(position, feature))
            .collect::<Result<Vec<_>, Error>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        if records.len() < total {
            log::warn!(
                "{:?}: kept {} of {} features",
                self.kind,
                records.len(),
                total
            );
        }
        PolygonCollection::new(records)
    }

    /// Convert one feature, `Ok(None)` when it fails the filtering stage.
    fn record_from_feature(
        &self,
        position: usize,
        feature: Feature,
    ) -> Result<Option<PolygonRecord>, Error> {
        let index = match feature.property(&self.index_field) {
            Some(value) => value.as_u64().ok_or_else(|| Error::DataQuality {
                index: position as u64,
                reason: format!("'{}' is not a non-negative integer", self.index_field),
            })?,
            None => position as u64,
        };

        let Some(timestamp) = feature
            .property(&self.timestamp_field)
            .and_then(normalize_timestamp)
        else {
            log::warn!(
                "{:?} feature {}: missing or unusable '{}', dropped",
                self.kind,
                index,
                self.timestamp_field
            );
            return Ok(None);
        };

        if let Some(field) = &self.acreage_field {
            if feature.property(field).and_then(Value::as_f64) == Some(0.0) {
                log::warn!("{:?} feature {}: zero '{}', dropped", self.kind, index, field);
                return Ok(None);
            }
        }

        let Some(geometry) = feature.geometry else {
            log::warn!("{:?} feature {}: no geometry, dropped", self.kind, index);
            return Ok(None);
        };
        let geometry = match Geometry::<f64>::try_from(geometry)? {
            Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
            Geometry::MultiPolygon(multi) if !multi.0.is_empty() => multi,
            other => {
                log::warn!(
                    "{:?} feature {}: non-polygonal geometry {:?}, dropped",
                    self.kind,
                    index,
                    geometry_name(&other)
                );
                return Ok(None);
            }
        };
        if !is_valid_perimeter(&geometry) {
            log::warn!("{:?} feature {}: invalid geometry, dropped", self.kind, index);
            return Ok(None);
        }

        let attributes = feature.properties.unwrap_or_default();
        Ok(Some(
            PolygonRecord::new(index, geometry, timestamp).with_attributes(attributes),
        ))
    }
}

/// Normalize a timestamp property, `None` when it is null, blank or not a
/// representable epoch-millisecond value.
fn normalize_timestamp(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|millis| millis.round() as i64))
            .and_then(DateTime::from_timestamp_millis)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

/// Ring-level validity: finite coordinates, a shell with non-zero area and
/// no ring crossing or touching itself away from its shared vertices.
fn is_valid_perimeter(geometry: &MultiPolygon<f64>) -> bool {
    geometry.0.iter().all(|polygon| {
        polygon.unsigned_area() > 0.0
            && std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .all(is_simple_ring)
    })
}

fn is_simple_ring(ring: &LineString<f64>) -> bool {
    if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return false;
    }
    let segments: Vec<_> = ring.lines().filter(|line| line.start != line.end).collect();
    if segments.len() < 3 {
        return false;
    }
    let last = segments.len() - 1;
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let adjacent = j == i + 1 || (i == 0 && j == last);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return false,
            }
        }
    }
    true
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
