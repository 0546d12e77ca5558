// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Polygon collections as delivered by the external loaders.
//!
//! A [`PolygonCollection`] is an ordered, immutable sequence of
//! [`PolygonRecord`]s. Every filtering stage returns a new collection so that
//! pipelines are explicit about which intermediate they operate on.

use crate::Error;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use geo::{BoundingRect, Intersects, MultiPolygon, Rect};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Naive layouts tried after RFC 3339. Naive values are interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Date-only layouts, midnight UTC. `%Y%m%d` is the NIFC `DATE_CUR` encoding.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Parse a normalized timestamp attribute.
///
/// Accepts RFC 3339 (`2023-08-01T12:00:00Z`, offsets are converted to UTC),
/// naive `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS` with optional
/// fractional seconds, and bare `YYYY-MM-DD` or `YYYYMMDD` dates (midnight
/// UTC). Epoch-millisecond attributes are normalized to RFC 3339 by the
/// loader before they get here.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::TimestampParse(value.to_string()))
}

/// A single perimeter polygon with its normalized observation time.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRecord {
    /// Stable index, unique within its collection and never reused.
    pub index: u64,
    /// Polygon or multi-polygon geometry in the shared planar CRS.
    pub geometry: MultiPolygon<f64>,
    /// Raw normalized timestamp; an empty string stands for a null value.
    pub timestamp: String,
    /// Source-specific attributes (acreage, fire year, ...) not used by the core.
    pub attributes: Map<String, Value>,
}

impl PolygonRecord {
    pub fn new(
        index: u64,
        geometry: impl Into<MultiPolygon<f64>>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            index,
            geometry: geometry.into(),
            timestamp: timestamp.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Parse this record's timestamp, see [`parse_timestamp`].
    pub fn parsed_timestamp(&self) -> Result<DateTime<Utc>, Error> {
        parse_timestamp(&self.timestamp)
    }

    /// Check the non-null geometry and timestamp precondition.
    pub fn validate(&self) -> Result<(), Error> {
        if self.geometry.0.is_empty() {
            return Err(Error::DataQuality {
                index: self.index,
                reason: "geometry is empty".to_string(),
            });
        }
        if self.timestamp.trim().is_empty() {
            return Err(Error::DataQuality {
                index: self.index,
                reason: "timestamp is missing".to_string(),
            });
        }
        Ok(())
    }
}

/// Ordered collection of perimeter records with lookup by stored index.
#[derive(Debug, Clone, Default)]
pub struct PolygonCollection {
    records: Vec<PolygonRecord>,
    positions: HashMap<u64, usize>,
}

impl PolygonCollection {
    /// Build a collection, rejecting duplicate stored indices.
    pub fn new(records: Vec<PolygonRecord>) -> Result<Self, Error> {
        let mut positions = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if positions.insert(record.index, position).is_some() {
                return Err(Error::DataQuality {
                    index: record.index,
                    reason: "duplicate index in collection".to_string(),
                });
            }
        }
        Ok(Self { records, positions })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PolygonRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[PolygonRecord] {
        &self.records
    }

    /// Look up a record by its stored index (not its position).
    pub fn get(&self, index: u64) -> Option<&PolygonRecord> {
        self.positions.get(&index).map(|&pos| &self.records[pos])
    }

    /// Fail fast on the first record violating the non-null precondition.
    pub fn validate(&self) -> Result<(), Error> {
        self.records.iter().try_for_each(PolygonRecord::validate)
    }

    /// Keep the records matching `predicate`, preserving order.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&PolygonRecord) -> bool,
    {
        let records: Vec<_> = self.records.iter().filter(|r| predicate(r)).cloned().collect();
        let positions = records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.index, pos))
            .collect();
        Self { records, positions }
    }

    /// Keep records whose timestamp parses and lies within `[start, end]`.
    pub fn filter_time_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.filter(|record| match record.parsed_timestamp() {
            Ok(t) => t >= start && t <= end,
            Err(_) => false,
        })
    }

    /// Keep records whose bounding rectangle intersects `bounds`.
    pub fn filter_bbox(&self, bounds: Rect<f64>) -> Self {
        self.filter(|record| {
            record
                .geometry
                .bounding_rect()
                .is_some_and(|rect| rect.intersects(&bounds))
        })
    }
}

impl<'a> IntoIterator for &'a PolygonCollection {
    type Item = &'a PolygonRecord;
    type IntoIter = std::slice::Iter<'a, PolygonRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::{coord, polygon};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]
        .into()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2023, 8, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2023-08-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-08-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-08-01T12:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-08-01 12:30:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2023-08-01").unwrap(),
            Utc.with_ymd_and_hms(2023, 8, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_compact_date() {
        assert_eq!(
            parse_timestamp("20230809").unwrap(),
            Utc.with_ymd_and_hms(2023, 8, 9, 0, 0, 0).unwrap()
        );
        assert!(matches!(
            parse_timestamp("20231309"),
            Err(Error::TimestampParse(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday afternoon"),
            Err(Error::TimestampParse(_))
        ));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let records = vec![
            PolygonRecord::new(1, square(0.0, 0.0, 1.0), "2023-08-01"),
            PolygonRecord::new(1, square(5.0, 5.0, 1.0), "2023-08-02"),
        ];
        assert!(matches!(
            PolygonCollection::new(records),
            Err(Error::DataQuality { index: 1, .. })
        ));
    }

    #[test]
    fn test_validate_fails_fast_on_null_fields() {
        let collection = PolygonCollection::new(vec![
            PolygonRecord::new(3, square(0.0, 0.0, 1.0), "2023-08-01"),
            PolygonRecord::new(7, MultiPolygon::new(vec![]), "2023-08-01"),
        ])
        .unwrap();
        assert!(matches!(
            collection.validate(),
            Err(Error::DataQuality { index: 7, .. })
        ));

        let collection =
            PolygonCollection::new(vec![PolygonRecord::new(9, square(0.0, 0.0, 1.0), "  ")])
                .unwrap();
        assert!(matches!(
            collection.validate(),
            Err(Error::DataQuality { index: 9, .. })
        ));
    }

    #[test]
    fn test_get_uses_stored_index() {
        let collection = PolygonCollection::new(vec![
            PolygonRecord::new(10, square(0.0, 0.0, 1.0), "2023-08-01"),
            PolygonRecord::new(4, square(5.0, 5.0, 1.0), "2023-08-02"),
        ])
        .unwrap();
        assert_eq!(collection.get(4).unwrap().timestamp, "2023-08-02");
        assert!(collection.get(1).is_none());
    }

    #[test]
    fn test_filters_return_new_collections() {
        let collection = PolygonCollection::new(vec![
            PolygonRecord::new(0, square(0.0, 0.0, 1.0), "2023-08-01"),
            PolygonRecord::new(1, square(50.0, 50.0, 1.0), "2023-08-05"),
            PolygonRecord::new(2, square(0.5, 0.5, 1.0), "not a date"),
        ])
        .unwrap();

        let windowed = collection.filter_time_window(
            Utc.with_ymd_and_hms(2023, 8, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 8, 2, 0, 0, 0).unwrap(),
        );
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed.records()[0].index, 0);

        let boxed = collection.filter_bbox(Rect::new(
            coord! { x: -1.0, y: -1.0 },
            coord! { x: 2.0, y: 2.0 },
        ));
        assert_eq!(boxed.len(), 2);
        assert!(boxed.get(2).is_some());

        // The source collection is untouched.
        assert_eq!(collection.len(), 3);
    }
}
