use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDateTime;
use regex::Regex;

use super::{Resolution, ResolutionMethod, Resolver};
use crate::exiftool::MetadataTool;
use crate::media::MediaFile;

/// Tags requested from the tool.
pub const PROBE_TAGS: &[&str] = &[
    "DateTimeOriginal",
    "CreateDate",
    "SubSecDateTimeOriginal",
    "DateTimeDigitized",
    "ModifyDate",
    "GPSDateStamp",
    "GPSTimeStamp",
];

/// Report labels tried in order.
const DATE_LABELS: &[&str] = &[
    "Date/Time Original",
    "Create Date",
    "Sub Sec Date/Time Original",
    "Date/Time Digitized",
    "Modify Date",
];

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.?\d*").unwrap());

/// Asks the external tool for any date-bearing tag it can find.
pub struct ProbeStage {
    tool: Arc<dyn MetadataTool>,
}

impl ProbeStage {
    pub fn new(tool: Arc<dyn MetadataTool>) -> Self {
        Self { tool }
    }
}

impl Resolver for ProbeStage {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Probe
    }

    fn resolve(&self, media: &MediaFile) -> Option<Resolution> {
        match self.tool.read_tags(&media.path, PROBE_TAGS) {
            Ok(report) => best_taken_datetime(&parse_report(&report)).map(Resolution::at),
            Err(e) => {
                log::warn!("Probe failed for {}: {}", media.path.display(), e);
                None
            }
        }
    }
}

/// Split `Label   : value` lines into a map.
pub fn parse_report(report: &str) -> HashMap<String, String> {
    report
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Highest-priority parseable date label, else GPS date + time.
pub fn best_taken_datetime(tags: &HashMap<String, String>) -> Option<NaiveDateTime> {
    DATE_LABELS
        .iter()
        .filter_map(|label| tags.get(*label))
        .find_map(|value| parse_tool_datetime(value))
        .or_else(|| gps_datetime(tags))
}

/// Drops sub-seconds (and anything after them) before parsing.
fn parse_tool_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.split('.').next().unwrap_or(value);
    NaiveDateTime::parse_from_str(value.trim(), "%Y:%m:%d %H:%M:%S").ok()
}

fn gps_datetime(tags: &HashMap<String, String>) -> Option<NaiveDateTime> {
    let date = tags.get("GPS Date Stamp")?;
    let time = tags.get("GPS Time Stamp")?;

    let parts: Vec<u32> = NUMBER_RE
        .find_iter(time)
        .take(3)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .map(|n| n as u32)
        .collect();
    if parts.is_empty() {
        return None;
    }
    let part = |i: usize| parts.get(i).copied().unwrap_or(0);

    let composed = format!(
        "{} {:02}:{:02}:{:02}",
        date.trim(),
        part(0),
        part(1),
        part(2)
    );
    NaiveDateTime::parse_from_str(&composed, "%Y:%m:%d %H:%M:%S").ok()
}
