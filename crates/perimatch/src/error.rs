// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

/// Comprehensive error type for perimeter matching and scoring operations.
///
/// Fatal conditions (bad input data, zero-area denominators, malformed
/// overlays, internal bugs) are reported through this enum. Non-fatal
/// conditions such as "no reference polygon matched" are encoded in the
/// results themselves and never surface here.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// GeoJSON parsing or geometry conversion error.
    GeoJsonError(geojson::Error),
    /// A record reached the core with a null geometry or timestamp, or a
    /// lookup by stored index failed.
    DataQuality {
        /// Stored index of the offending record.
        index: u64,
        /// Human readable description of the violation.
        reason: String,
    },
    /// A ratio metric had an exactly-zero denominator area.
    DivisionByZero {
        /// Name of the metric being computed.
        metric: &'static str,
    },
    /// A symmetric difference of a single pair did not collapse to one row.
    InvalidPair {
        /// Number of rows produced by the overlay.
        rows: usize,
    },
    /// An orchestrator sanity check failed; indicates a matcher bug.
    InternalConsistency(String),
    /// A timestamp could not be parsed by any supported format.
    TimestampParse(String),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// Polars dataframe operation error (only with "polars" feature).
    #[cfg(feature = "polars")]
    PolarsError(polars::error::PolarsError),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<geojson::Error> for Error {
    fn from(err: geojson::Error) -> Self {
        Error::GeoJsonError(err)
    }
}

#[cfg(feature = "polars")]
impl From<polars::error::PolarsError> for Error {
    fn from(err: polars::error::PolarsError) -> Self {
        Error::PolarsError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::GeoJsonError(e) => write!(f, "GeoJSON error: {}", e),
            Error::DataQuality { index, reason } => {
                write!(f, "Data quality error at index {}: {}", index, reason)
            }
            Error::DivisionByZero { metric } => {
                write!(f, "Division by zero area while computing {}", metric)
            }
            Error::InvalidPair { rows } => write!(
                f,
                "Invalid pair: symmetric difference produced {} rows, expected 1",
                rows
            ),
            Error::InternalConsistency(s) => write!(f, "Internal consistency error: {}", s),
            Error::TimestampParse(s) => write!(f, "Unparsable timestamp: {}", s),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            #[cfg(feature = "polars")]
            Error::PolarsError(e) => write!(f, "Polars error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::GeoJsonError(e) => Some(e),
            #[cfg(feature = "polars")]
            Error::PolarsError(e) => Some(e),
            _ => None,
        }
    }
}
