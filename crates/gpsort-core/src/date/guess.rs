use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::{FilenameFallback, Resolution, ResolutionMethod, Resolver};
use crate::media::MediaFile;

struct DatePattern {
    regex: &'static LazyLock<Regex>,
    /// Two-digit years are read as 20YY.
    two_digit_year: bool,
}

static RE_0: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[.\-_]?(\d{2})[.\-_]?(\d{2})").unwrap());
static RE_1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})[.\-_]?(\d{1,2})[.\-_]?(\d{1,2})").unwrap());
static RE_2: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})[.\-_]?(\d{2})[.\-_]?(\d{2})").unwrap());
static RE_3: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})[.\-_]?(\d{1,2})[.\-_]?(\d{1,2})").unwrap());

static PATTERNS: &[DatePattern] = &[
    DatePattern {
        regex: &RE_0,
        two_digit_year: false,
    },
    DatePattern {
        regex: &RE_1,
        two_digit_year: false,
    },
    DatePattern {
        regex: &RE_2,
        two_digit_year: true,
    },
    DatePattern {
        regex: &RE_3,
        two_digit_year: true,
    },
];

const EARLIEST: (i32, u32, u32) = (2005, 1, 1);
const LATEST: (i32, u32, u32) = (2025, 12, 31);

fn ymd((y, m, d): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Date used by [`FilenameFallback::DefaultDate`].
pub fn fallback_date() -> NaiveDateTime {
    ymd(EARLIEST).and_time(chrono::NaiveTime::MIN)
}

/// Guesses the capture date from digits in the filename.
pub struct FilenameStage {
    fallback: FilenameFallback,
}

impl FilenameStage {
    pub fn new(fallback: FilenameFallback) -> Self {
        Self { fallback }
    }
}

impl Resolver for FilenameStage {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Filename
    }

    fn resolve(&self, media: &MediaFile) -> Option<Resolution> {
        let guessed = guess_date_from_filename(&media.name_lossy());
        match (guessed, self.fallback) {
            (Some(dt), _) => Some(Resolution::at(dt)),
            (None, FilenameFallback::DefaultDate) => Some(Resolution::at(fallback_date())),
            (None, FilenameFallback::Unresolved) => None,
        }
    }
}

/// First pattern (4-digit year family, then 2-digit) whose leftmost match is a
/// real date inside 2005-01-01..=2025-12-31.
pub fn guess_date_from_filename(filename: &str) -> Option<NaiveDateTime> {
    let basename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let range = ymd(EARLIEST)..=ymd(LATEST);

    for pat in PATTERNS {
        let Some(caps) = pat.regex.captures(basename) else {
            continue;
        };
        let (Ok(y), Ok(m), Ok(d)) = (
            caps[1].parse::<i32>(),
            caps[2].parse::<u32>(),
            caps[3].parse::<u32>(),
        ) else {
            continue;
        };
        let year = if pat.two_digit_year { 2000 + y } else { y };
        if let Some(date) = NaiveDate::from_ymd_opt(year, m, d) {
            if range.contains(&date) {
                return Some(date.and_time(chrono::NaiveTime::MIN));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guess(name: &str) -> Option<String> {
        guess_date_from_filename(name).map(|dt| dt.format("%Y-%m-%d").to_string())
    }

    #[test]
    fn test_two_digit_family_after_out_of_range_four_digit() {
        // 4-digit family reads 1804-02-05 first.
        assert_eq!(guess("KakaoTalk_180425.jpg").as_deref(), Some("2018-04-25"));
    }

    #[test]
    fn test_guess_patterns() {
        assert_eq!(guess("IMG_20190315_120000.png").as_deref(), Some("2019-03-15"));
        assert_eq!(guess("Screenshot_2019-09-19-05-38-57.jpg").as_deref(), Some("2019-09-19"));
        assert_eq!(guess("2016_01_30_11_49_15.mp4").as_deref(), Some("2016-01-30"));
        assert_eq!(guess("trip 2014.7.4.jpg").as_deref(), Some("2014-07-04"));
        assert!(guess("random_photo.jpg").is_none());
        assert!(guess("mystery.heic").is_none());
    }

    #[test]
    fn test_out_of_range_dates_rejected() {
        assert!(guess("scan_19990101.jpg").is_none());
        assert!(guess("IMG_20260101.jpg").is_none());
        assert_eq!(guess("IMG_20251231.jpg").as_deref(), Some("2025-12-31"));
        assert_eq!(guess("IMG_20050101.jpg").as_deref(), Some("2005-01-01"));
    }

    #[test]
    fn test_invalid_calendar_date_falls_to_later_pattern() {
        // Two-digit family reads these as 2020-19-xx, also invalid.
        assert!(guess("x_20191345.jpg").is_none());
        assert!(guess("x_20190230.jpg").is_none());
    }

    #[test]
    fn test_fallback_policy() {
        let media = MediaFile::from_path(Path::new("/src/mystery.heic")).unwrap();
        assert!(FilenameStage::new(FilenameFallback::Unresolved)
            .resolve(&media)
            .is_none());
        let found = FilenameStage::new(FilenameFallback::DefaultDate)
            .resolve(&media)
            .unwrap();
        assert_eq!(found.timestamp.to_string(), "2005-01-01 00:00:00");
    }

    #[test]
    fn test_results_always_in_range() {
        for name in ["0000000000.jpg", "99999999.png", "IMG_1234_5678.jpg", "20241231.mov"] {
            if let Some(dt) = guess_date_from_filename(name) {
                let d = dt.date();
                assert!(d >= ymd(EARLIEST) && d <= ymd(LATEST), "{name}");
            }
        }
    }
}
