use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use super::{GeoLocation, Resolution, ResolutionMethod, Resolver};
use crate::media::MediaFile;

/// Reads the export's JSON sidecar(s) next to the media file.
pub struct SidecarStage;

impl Resolver for SidecarStage {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Json
    }

    fn resolve(&self, media: &MediaFile) -> Option<Resolution> {
        for sidecar in find_sidecars(media) {
            let Ok(bytes) = fs::read(&sidecar) else {
                continue;
            };
            match parse_sidecar(&bytes) {
                Some(resolution) => return Some(resolution),
                None => log::debug!("{}: no usable timestamp", sidecar.display()),
            }
        }
        None
    }
}

/// Timestamp keys, most preferred first.
pub const TIME_KEYS: &[&str] = &[
    "photoTakenTime",
    "creationTime",
    "mediaCreateTime",
    "trackCreateTime",
    "takenTimestamp",
    "dateAcquired",
    "modificationTime",
];

/// Location containers, most preferred first.
pub const GEO_KEYS: &[&str] = &["geoData", "geoDataExif"];

#[derive(Debug, Clone, Deserialize)]
pub struct TimeField {
    pub timestamp: EpochSeconds,
}

/// Exports write the epoch as a string; older tooling wrote a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    Number(i64),
    Float(f64),
    Text(String),
}

impl EpochSeconds {
    fn seconds(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Float(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoField {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Timestamp from the first key present, interpreted as UTC.
///
/// Only that key is decoded: if it is unusable the sidecar has no timestamp,
/// and keys after it are never looked at.
pub fn taken_time(data: &Value) -> Option<NaiveDateTime> {
    let field = TIME_KEYS.iter().find_map(|key| data.get(*key))?;
    let field = TimeField::deserialize(field).ok()?;
    let epoch = field.timestamp.seconds()?;
    chrono::DateTime::from_timestamp(epoch, 0).map(|utc| utc.naive_utc())
}

/// First container holding a non-(0,0) coordinate. Malformed containers are skipped.
pub fn location(data: &Value) -> Option<GeoLocation> {
    GEO_KEYS
        .iter()
        .filter_map(|key| data.get(*key))
        .filter_map(|geo| GeoField::deserialize(geo).ok())
        .find_map(|geo| GeoLocation::non_zero(geo.latitude, geo.longitude))
}

/// Parse a sidecar; `None` if it is not JSON or carries no usable timestamp.
pub fn parse_sidecar(json_bytes: &[u8]) -> Option<Resolution> {
    let data: Value = serde_json::from_slice(json_bytes).ok()?;
    let timestamp = taken_time(&data)?;
    Some(Resolution {
        timestamp,
        location: location(&data),
    })
}

/// Sidecars named `<filename>.*.json` (sorted), then a plain `<filename>.json`.
pub fn find_sidecars(media: &MediaFile) -> Vec<PathBuf> {
    let Some(dir) = media.path.parent() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let filename = media.name_lossy();
    let stem_prefix: String = format!("{}.", filename).nfc().collect();
    let plain_name: String = format!("{}.json", filename).nfc().collect();

    let mut matches = Vec::new();
    let mut plain = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let name: String = name.to_string_lossy().nfc().collect();
        if name == plain_name {
            plain = Some(path);
        } else if name
            .strip_prefix(&stem_prefix)
            .map_or(false, |rest| rest.ends_with(".json"))
        {
            matches.push(path);
        }
    }

    matches.sort();
    matches.extend(plain);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn media_in(dir: &std::path::Path, name: &str) -> MediaFile {
        let path = dir.join(name);
        fs::write(&path, b"media").unwrap();
        MediaFile::from_path(&path).unwrap()
    }

    #[test]
    fn test_photo_taken_time_wins_over_creation_time() {
        let json = br#"{
            "creationTime": {"timestamp": "1262304000"},
            "photoTakenTime": {"timestamp": "1609459200", "formatted": "Jan 1, 2021"}
        }"#;
        let found = parse_sidecar(json).unwrap();
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(found.timestamp, expected);
    }

    #[test]
    fn test_integer_timestamp_and_later_keys() {
        let found = parse_sidecar(br#"{"trackCreateTime": {"timestamp": 1609459200}}"#).unwrap();
        assert_eq!(found.timestamp.to_string(), "2021-01-01 00:00:00");

        let found = parse_sidecar(br#"{"modificationTime": {"timestamp": "0"}}"#).unwrap();
        assert_eq!(found.timestamp.to_string(), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_location_skips_zero_container() {
        let json = br#"{
            "photoTakenTime": {"timestamp": "1609459200"},
            "geoData": {"latitude": 0.0, "longitude": 0.0},
            "geoDataExif": {"latitude": 37.5665, "longitude": 126.978}
        }"#;
        let found = parse_sidecar(json).unwrap();
        let loc = found.location.unwrap();
        assert_eq!(loc.latitude, 37.5665);
        assert_eq!(loc.longitude, 126.978);

        let json = br#"{
            "photoTakenTime": {"timestamp": "1"},
            "geoData": {"latitude": 0.0, "longitude": 0.0}
        }"#;
        assert!(parse_sidecar(json).unwrap().location.is_none());
    }

    #[test]
    fn test_only_the_winning_key_is_decoded() {
        let json = br#"{
            "photoTakenTime": {"timestamp": "1609459200"},
            "creationTime": "yesterday",
            "geoData": {"latitude": "north"},
            "geoDataExif": {"latitude": 37.5665, "longitude": 126.978}
        }"#;
        let found = parse_sidecar(json).unwrap();
        assert_eq!(found.timestamp.to_string(), "2021-01-01 00:00:00");
        assert_eq!(found.location.unwrap().latitude, 37.5665);

        // A bad preferred key is not rescued by a later one.
        let json = br#"{
            "photoTakenTime": {"timestamp": "soon"},
            "creationTime": {"timestamp": "1609459200"}
        }"#;
        assert!(parse_sidecar(json).is_none());
    }

    #[test]
    fn test_float_timestamp_truncates() {
        let found = parse_sidecar(br#"{"photoTakenTime": {"timestamp": 1609459200.0}}"#).unwrap();
        assert_eq!(found.timestamp.to_string(), "2021-01-01 00:00:00");
        let found = parse_sidecar(br#"{"photoTakenTime": {"timestamp": 1609459200.9}}"#).unwrap();
        assert_eq!(found.timestamp.to_string(), "2021-01-01 00:00:00");
    }

    #[test]
    fn test_unusable_sidecars() {
        assert!(parse_sidecar(b"{ not json").is_none());
        assert!(parse_sidecar(br#"{"title": "x.jpg"}"#).is_none());
        assert!(parse_sidecar(br#"{"photoTakenTime": {"timestamp": "soon"}}"#).is_none());
    }

    #[test]
    fn test_find_sidecars_glob_semantics() {
        let dir = tempdir().unwrap();
        let media = media_in(dir.path(), "video.mp4");
        fs::write(dir.path().join("video.mp4.supplemental-metadata.json"), b"{}").unwrap();
        fs::write(dir.path().join("video.mp4.a.json"), b"{}").unwrap();
        fs::write(dir.path().join("video.mp4.json"), b"{}").unwrap();
        fs::write(dir.path().join("video.mp4.supplemental.txt"), b"{}").unwrap();
        fs::write(dir.path().join("other.mp4.a.json"), b"{}").unwrap();

        let names: Vec<String> = find_sidecars(&media)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "video.mp4.a.json",
                "video.mp4.supplemental-metadata.json",
                "video.mp4.json"
            ]
        );
    }

    #[test]
    fn test_stage_skips_malformed_and_uses_next() {
        let dir = tempdir().unwrap();
        let media = media_in(dir.path(), "video.mp4");
        fs::write(dir.path().join("video.mp4.a.json"), b"{ broken").unwrap();
        fs::write(
            dir.path().join("video.mp4.supplemental.json"),
            br#"{"creationTime": {"timestamp": 1609459200}}"#,
        )
        .unwrap();

        let found = SidecarStage.resolve(&media).unwrap();
        assert_eq!(found.timestamp.to_string(), "2021-01-01 00:00:00");
    }

    #[test]
    fn test_stage_declines_without_sidecar() {
        let dir = tempdir().unwrap();
        let media = media_in(dir.path(), "lonely.jpg");
        assert!(SidecarStage.resolve(&media).is_none());
    }
}
