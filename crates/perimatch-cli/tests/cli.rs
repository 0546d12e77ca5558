// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DETECTED: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "index": 0, "t": "2023-08-10T00:00:00Z" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]]
            }
        },
        {
            "type": "Feature",
            "properties": { "index": 1, "t": "2023-08-10T00:00:00Z" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[500, 500], [510, 500], [510, 510], [500, 510], [500, 500]]]
            }
        }
    ]
}"#;

const REFERENCE: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "index": 7, "DATE_CUR_STAMP": "2023-08-09" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[5, 5], [15, 5], [15, 15], [5, 15], [5, 5]]]
            }
        }
    ]
}"#;

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let detected = dir.join("detected.geojson");
    let reference = dir.join("reference.geojson");
    std::fs::write(&detected, DETECTED).unwrap();
    std::fs::write(&reference, REFERENCE).unwrap();
    (detected, reference)
}

#[test]
fn test_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("version");
    cmd.assert()
        .success()
        .stdout(predicates::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn test_match_report() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("match").arg(&detected).arg(&reference);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("PERIMETER SIMILARITY REPORT"))
        .stdout(predicates::str::contains("Detected 0 ↔ Reference 7"))
        .stdout(predicates::str::contains("Matched:     1/2"));
    Ok(())
}

#[test]
fn test_match_json() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("match")
        .arg(&detected)
        .arg(&reference)
        .args(["--json", "--unit", "feet"]);
    let output = cmd.ok()?.stdout;
    let table: serde_json::Value = serde_json::from_slice(&output)?;

    assert_eq!(table["unit"], "feet");
    let pairs = table["match_set"].as_array().unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0]["reference_index"], 7);
    assert!(pairs[1]["reference_index"].is_null());

    let columns = table["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 7);
    let iou = columns.iter().find(|c| c["metric"] == "iou").unwrap();
    let value = iou["values"][0].as_f64().unwrap();
    assert!((value - 25.0 / 175.0).abs() < 1e-9);
    assert!(iou["values"][1].is_null());
    Ok(())
}

#[test]
fn test_match_narrow_window() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("match")
        .arg(&detected)
        .arg(&reference)
        .args(["--day-range", "0", "--json"]);
    let output = cmd.ok()?.stdout;
    let table: serde_json::Value = serde_json::from_slice(&output)?;
    let pairs = table["match_set"].as_array().unwrap();
    assert!(pairs.iter().all(|p| p["reference_index"].is_null()));
    Ok(())
}

#[test]
fn test_match_missing_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (_, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("match")
        .arg(dir.path().join("missing.geojson"))
        .arg(&reference);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn test_search() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("search")
        .arg(&detected)
        .arg(&reference)
        .args(["--detected-index", "0", "--reference-index", "7"])
        .args(["--metric", "f1", "--start", "0.003", "--min", "0", "--json"]);
    let output = cmd.ok()?.stdout;
    let outcome: serde_json::Value = serde_json::from_slice(&output)?;

    assert_eq!(outcome["metric"], "f1");
    assert_eq!(outcome["trace"].as_array().unwrap().len(), 3);
    assert_eq!(outcome["best_tolerance"].as_f64(), Some(0.003));
    let best = outcome["best_value"].as_f64().unwrap();
    assert!((best - 0.25).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_search_unknown_metric() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("search")
        .arg(&detected)
        .arg(&reference)
        .args(["--detected-index", "0", "--reference-index", "7"])
        .args(["--metric", "kappa", "--start", "0.003"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("unknown metric"));
    Ok(())
}

/// Reference with a non-default time property and no `DATE_CUR_STAMP`.
const REFERENCE_CUSTOM_FIELD: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "index": 7, "surveyed": "2023-08-09" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[5, 5], [15, 5], [15, 15], [5, 15], [5, 5]]]
            }
        }
    ]
}"#;

/// WFIGS reference carrying epoch milliseconds (2023-08-09T00:00:00Z).
const REFERENCE_WFIGS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {
            "type": "Feature",
            "properties": { "index": 7, "poly_PolygonDateTime": 1691539200000 },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[5, 5], [15, 5], [15, 15], [5, 15], [5, 5]]]
            }
        }
    ]
}"#;

#[test]
fn test_search_with_reference_time_field() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, _) = write_inputs(dir.path());
    let reference = dir.path().join("surveyed.geojson");
    std::fs::write(&reference, REFERENCE_CUSTOM_FIELD)?;

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("search")
        .arg(&detected)
        .arg(&reference)
        .args(["--detected-index", "0", "--reference-index", "7"])
        .args(["--reference-time-field", "surveyed"])
        .args(["--metric", "iou", "--start", "0.002", "--min", "0", "--json"]);
    let output = cmd.ok()?.stdout;
    let outcome: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(outcome["trace"].as_array().unwrap().len(), 2);
    let best = outcome["best_value"].as_f64().unwrap();
    assert!((best - 25.0 / 175.0).abs() < 1e-9);

    // Without the override the reference is filtered out at load time.
    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("search")
        .arg(&detected)
        .arg(&reference)
        .args(["--detected-index", "0", "--reference-index", "7"])
        .args(["--start", "0.002"]);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn test_match_wfigs_reference_source() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, _) = write_inputs(dir.path());
    let reference = dir.path().join("wfigs.geojson");
    std::fs::write(&reference, REFERENCE_WFIGS)?;

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("match")
        .arg(&detected)
        .arg(&reference)
        .args(["--reference-source", "wfigs_current", "--json"]);
    let output = cmd.ok()?.stdout;
    let table: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(table["match_set"][0]["reference_index"], 7);
    Ok(())
}

#[test]
fn test_match_rejects_detection_as_reference_source() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (detected, reference) = write_inputs(dir.path());

    let mut cmd = Command::cargo_bin("perimatch")?;
    cmd.arg("match")
        .arg(&detected)
        .arg(&reference)
        .args(["--reference-source", "detection"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("not a reference source"));
    Ok(())
}
