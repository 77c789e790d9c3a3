//! Sidecar JSON parsing and sidecar→media matching.
//!
//! An export pipeline leaves each media file's capture metadata in a JSON
//! sidecar next to it. [`MetadataRecord::from_json`] normalizes a sidecar
//! into the immutable record the codecs consume, and [`match_media_file`]
//! resolves the record back to the single media file it describes.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{RestoreError, Result};

/// Wire shape of a sidecar file. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSidecar {
    #[serde(default)]
    title: String,
    photo_taken_time: Option<RawTimeInfo>,
    geo_data_exif: Option<RawGeoData>,
}

#[derive(Debug, Deserialize)]
struct RawTimeInfo {
    timestamp: Option<String>,
    #[allow(dead_code)]
    formatted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGeoData {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
    #[serde(default)]
    altitude: f64,
}

/// A GPS fix carried by a sidecar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_meters: f64,
}

/// Normalized sidecar content. Immutable once constructed; produced once
/// per sidecar and consumed by exactly one codec invocation.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    /// Expected media filename as recorded by the export.
    pub title: String,
    /// Capture time, if the sidecar carried a parseable unix timestamp.
    pub taken_at: Option<DateTime<Utc>>,
    /// GPS fix; `None` when the export wrote the 0/0 "no GPS" sentinel.
    pub gps: Option<GpsPosition>,
}

impl MetadataRecord {
    /// Parse and normalize a sidecar's JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawSidecar = serde_json::from_str(json)
            .map_err(|e| RestoreError::UnsupportedEncoding(format!("sidecar JSON: {e}")))?;

        let taken_at = raw
            .photo_taken_time
            .and_then(|t| t.timestamp)
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

        // The export writes latitude = longitude = 0 when no fix exists.
        let gps = raw.geo_data_exif.and_then(|g| {
            if g.latitude == 0.0 && g.longitude == 0.0 {
                None
            } else {
                Some(GpsPosition {
                    latitude: g.latitude,
                    longitude: g.longitude,
                    altitude_meters: g.altitude,
                })
            }
        });

        Ok(Self { title: raw.title, taken_at, gps })
    }
}

/// Resolve a sidecar to the single media file it describes.
///
/// Rules are tried in order, and the first rule that yields exactly one
/// candidate wins:
///
/// 1. exact — the sidecar's directory joined with `title` verbatim
/// 2. case-insensitive filename match within the directory
/// 3. stem-prefix — a directory entry whose stem starts with the title's
///    stem, with matching extensions (export tools truncate or suffix
///    names, e.g. `IMG_0001(1).jpg`)
///
/// A rule yielding more than one candidate fails with
/// [`RestoreError::AmbiguousMatch`] rather than guessing.
pub fn match_media_file(sidecar_path: &Path, title: &str) -> Result<PathBuf> {
    let dir = sidecar_path.parent().unwrap_or_else(|| Path::new("."));

    if title.is_empty() {
        return Err(RestoreError::NoMatch { title: String::new() });
    }

    // Rule 1: exact path.
    let exact = dir.join(title);
    if exact.is_file() {
        return Ok(exact);
    }

    let entries = read_dir_files(dir)?;

    // Rule 2: case-insensitive filename.
    let title_lower = title.to_lowercase();
    let ci: Vec<&PathBuf> = entries
        .iter()
        .filter(|p| file_name_lower(p).is_some_and(|n| n == title_lower))
        .collect();
    match ci.len() {
        1 => return Ok(ci[0].clone()),
        0 => {}
        _ => {
            return Err(RestoreError::AmbiguousMatch {
                title: title.to_string(),
                candidates: ci.into_iter().cloned().collect(),
            });
        }
    }

    // Rule 3: stem prefix with matching extension.
    let (title_stem, title_ext) = split_stem_ext(title);
    let title_stem_lower = title_stem.to_lowercase();
    let title_ext_lower = title_ext.to_lowercase();
    let prefixed: Vec<&PathBuf> = entries
        .iter()
        .filter(|p| {
            let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            let (stem, ext) = split_stem_ext(name);
            stem.to_lowercase().starts_with(&title_stem_lower)
                && ext.to_lowercase() == title_ext_lower
        })
        .collect();
    match prefixed.len() {
        1 => Ok(prefixed[0].clone()),
        0 => Err(RestoreError::NoMatch { title: title.to_string() }),
        _ => Err(RestoreError::AmbiguousMatch {
            title: title.to_string(),
            candidates: prefixed.into_iter().cloned().collect(),
        }),
    }
}

fn read_dir_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    // Directory iteration order is platform-dependent; sort so ambiguity
    // reporting and rule evaluation are deterministic.
    files.sort();
    Ok(files)
}

fn file_name_lower(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.to_lowercase())
}

/// Split `name.ext` into (`name`, `ext`); no dot means empty extension.
fn split_stem_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SIDECAR_FULL: &str = r#"{
        "title": "IMG_0001.jpg",
        "photoTakenTime": {"timestamp": "1577883600", "formatted": "Jan 1, 2020"},
        "geoDataExif": {"latitude": 48.8584, "longitude": 2.2945, "altitude": 35.0}
    }"#;

    // ── MetadataRecord::from_json ────────────────────────────────────

    #[test]
    fn parses_full_sidecar() {
        let record = MetadataRecord::from_json(SIDECAR_FULL).unwrap();
        assert_eq!(record.title, "IMG_0001.jpg");
        assert_eq!(record.taken_at.unwrap().timestamp(), 1_577_883_600);
        let gps = record.gps.unwrap();
        assert_eq!(gps.latitude, 48.8584);
        assert_eq!(gps.longitude, 2.2945);
        assert_eq!(gps.altitude_meters, 35.0);
    }

    #[test]
    fn zero_gps_sentinel_means_absent() {
        let json = r#"{"title":"a.jpg","geoDataExif":{"latitude":0,"longitude":0,"altitude":0}}"#;
        let record = MetadataRecord::from_json(json).unwrap();
        assert!(record.gps.is_none());
    }

    #[test]
    fn zero_latitude_alone_is_a_real_fix() {
        let json = r#"{"title":"a.jpg","geoDataExif":{"latitude":0,"longitude":2.5,"altitude":0}}"#;
        let record = MetadataRecord::from_json(json).unwrap();
        assert!(record.gps.is_some());
    }

    #[test]
    fn missing_geo_data_means_absent() {
        let json = r#"{"title":"a.jpg"}"#;
        let record = MetadataRecord::from_json(json).unwrap();
        assert!(record.gps.is_none());
        assert!(record.taken_at.is_none());
    }

    #[test]
    fn unparseable_timestamp_means_absent() {
        let json = r#"{"title":"a.jpg","photoTakenTime":{"timestamp":"not-a-number","formatted":"x"}}"#;
        let record = MetadataRecord::from_json(json).unwrap();
        assert!(record.taken_at.is_none());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"title":"a.jpg","imageViews":"42","somethingNew":{"a":1}}"#;
        assert!(MetadataRecord::from_json(json).is_ok());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(MetadataRecord::from_json("{not json").is_err());
    }

    // ── match_media_file ─────────────────────────────────────────────

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn exact_match_wins() {
        let dir = TempDir::new().unwrap();
        let media = touch(&dir, "IMG_0001.jpg");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        let found = match_media_file(&sidecar, "IMG_0001.jpg").unwrap();
        assert_eq!(found, media);
    }

    #[test]
    fn case_insensitive_match_when_exact_fails() {
        let dir = TempDir::new().unwrap();
        let media = touch(&dir, "IMG_0001.JPG");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        let found = match_media_file(&sidecar, "IMG_0001.jpg").unwrap();
        assert_eq!(found, media);
    }

    #[test]
    fn case_collision_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "IMG_0001.JPG");
        touch(&dir, "img_0001.jpg");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        // Both casings present — refusing to guess beats picking one.
        let err = match_media_file(&sidecar, "IMG_0001.jpg").unwrap_err();
        match err {
            RestoreError::AmbiguousMatch { candidates, .. } => {
                assert_eq!(candidates.len(), 2)
            }
            other => panic!("expected AmbiguousMatch, got {other:?}"),
        }
    }

    #[test]
    fn stem_prefix_matches_suffixed_export() {
        let dir = TempDir::new().unwrap();
        let media = touch(&dir, "IMG_0001(1).jpg");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        let found = match_media_file(&sidecar, "IMG_0001.jpg").unwrap();
        assert_eq!(found, media);
    }

    #[test]
    fn stem_prefix_requires_matching_extension() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "IMG_0001(1).heic");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        assert!(matches!(
            match_media_file(&sidecar, "IMG_0001.jpg"),
            Err(RestoreError::NoMatch { .. })
        ));
    }

    #[test]
    fn stem_prefix_collision_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "IMG_0001(1).jpg");
        touch(&dir, "IMG_0001(2).jpg");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        assert!(matches!(
            match_media_file(&sidecar, "IMG_0001.jpg"),
            Err(RestoreError::AmbiguousMatch { .. })
        ));
    }

    #[test]
    fn no_match_in_empty_directory() {
        let dir = TempDir::new().unwrap();
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        assert!(matches!(
            match_media_file(&sidecar, "IMG_0001.jpg"),
            Err(RestoreError::NoMatch { .. })
        ));
    }

    #[test]
    fn exact_match_is_not_ambiguous_despite_prefix_sibling() {
        let dir = TempDir::new().unwrap();
        let media = touch(&dir, "IMG_0001.jpg");
        touch(&dir, "IMG_0001(1).jpg");
        let sidecar = dir.path().join("IMG_0001.jpg.json");

        let found = match_media_file(&sidecar, "IMG_0001.jpg").unwrap();
        assert_eq!(found, media);
    }
}
