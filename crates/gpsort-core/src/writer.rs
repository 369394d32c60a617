use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::date::{GeoLocation, ResolutionResult};
use crate::exiftool::{MetadataTool, TagSet, ToolError};
use crate::media::MediaFile;

/// Timestamp format the tool expects.
pub const TAG_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// How far down the fallback ladder tagging had to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOutcome {
    /// Full tag set applied on the first attempt.
    Written,
    /// Full tag set applied after re-encoding the file.
    WrittenAfterReencode,
    /// Only DateTimeOriginal (plus location) could be applied.
    WrittenMinimal,
    /// Nothing to write, or the format is not taggable.
    Skipped,
    /// Every attempt failed; the file keeps whatever tags it had.
    Failed,
}

/// Writes the resolved timestamp and location into a file's metadata.
pub struct MetadataWriter {
    tool: Arc<dyn MetadataTool>,
}

impl MetadataWriter {
    pub fn new(tool: Arc<dyn MetadataTool>) -> Self {
        Self { tool }
    }

    /// Tag `media` (already at its final location). Never fails outward.
    pub fn apply(&self, media: &MediaFile, result: &ResolutionResult) -> TagOutcome {
        let Some(timestamp) = result.timestamp() else {
            return TagOutcome::Skipped;
        };
        if !media.is_taggable() {
            log::warn!("Tagging not supported for {}, skipped", media.path.display());
            return TagOutcome::Skipped;
        }

        let full = full_tag_set(media, timestamp, result.location());
        let path = &media.path;

        let first = match self.tool.write_tags(path, &full) {
            Ok(()) => return TagOutcome::Written,
            Err(e) => e,
        };
        log::debug!("Tag write failed for {}: {}", path.display(), first);

        // A malformed metadata block often makes the tool refuse the file;
        // decoding and re-saving drops it.
        let retried = if media.is_image() {
            reencode(path).and_then(|()| self.tool.write_tags(path, &full))
        } else {
            Err(first)
        };
        match retried {
            Ok(()) => {
                log::warn!("Tagged {} after re-encoding", path.display());
                return TagOutcome::WrittenAfterReencode;
            }
            Err(e) => log::warn!("Full tag write failed for {}: {}", path.display(), e),
        }

        let minimal = minimal_tag_set(timestamp, result.location());
        match self.tool.write_tags(path, &minimal) {
            Ok(()) => {
                log::warn!("Fallback: only DateTimeOriginal set for {}", path.display());
                TagOutcome::WrittenMinimal
            }
            Err(e) => {
                log::error!("Tagging failed for {}: {}", path.display(), e);
                TagOutcome::Failed
            }
        }
    }
}

/// AllDates (+ container dates for video) and location.
pub fn full_tag_set(
    media: &MediaFile,
    timestamp: NaiveDateTime,
    location: Option<GeoLocation>,
) -> TagSet {
    let date = timestamp.format(TAG_DATE_FORMAT).to_string();
    let mut tags = TagSet::new();
    tags.set("AllDates", date.as_str());
    if media.is_video() {
        tags.set("MediaCreateDate", date.as_str())
            .set("TrackCreateDate", date.as_str());
    }
    if let Some(loc) = location {
        append_gps_tags(&mut tags, loc);
    }
    tags
}

/// Last resort: DateTimeOriginal only, keeping the location.
pub fn minimal_tag_set(timestamp: NaiveDateTime, location: Option<GeoLocation>) -> TagSet {
    let mut tags = TagSet::new();
    tags.set(
        "DateTimeOriginal",
        timestamp.format(TAG_DATE_FORMAT).to_string(),
    );
    if let Some(loc) = location {
        append_gps_tags(&mut tags, loc);
    }
    tags
}

fn append_gps_tags(tags: &mut TagSet, loc: GeoLocation) {
    tags.set("GPSLatitude", loc.latitude.to_string())
        .set("GPSLatitudeRef", loc.latitude_ref())
        .set("GPSLongitude", loc.longitude.to_string())
        .set("GPSLongitudeRef", loc.longitude_ref());
}

fn reencode(path: &Path) -> Result<(), ToolError> {
    let to_err = |source| ToolError::Reencode {
        path: path.to_path_buf(),
        source,
    };
    let img = image::open(path).map_err(to_err)?;
    img.save(path).map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::{Resolution, ResolutionMethod};
    use crate::exiftool::testing::FakeTool;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn resolved(location: Option<GeoLocation>) -> ResolutionResult {
        ResolutionResult::resolved(
            ResolutionMethod::Json,
            Resolution {
                timestamp: ts(),
                location,
            },
        )
    }

    fn writer(tool: &Arc<FakeTool>) -> MetadataWriter {
        MetadataWriter::new(tool.clone())
    }

    #[test]
    fn test_video_gets_container_dates() {
        let tool = Arc::new(FakeTool::default());
        let media = MediaFile::from_path(Path::new("/dest/2021/01/video.mp4")).unwrap();
        assert_eq!(writer(&tool).apply(&media, &resolved(None)), TagOutcome::Written);

        let writes = tool.recorded();
        assert_eq!(writes.len(), 1);
        let tags = &writes[0].1;
        assert_eq!(tags.get("AllDates"), Some("2021:01:01 00:00:00"));
        assert_eq!(tags.get("MediaCreateDate"), Some("2021:01:01 00:00:00"));
        assert_eq!(tags.get("TrackCreateDate"), Some("2021:01:01 00:00:00"));
        assert!(!tags.contains("GPSLatitude"));
    }

    #[test]
    fn test_photo_with_location() {
        let tool = Arc::new(FakeTool::default());
        let media = MediaFile::from_path(Path::new("/dest/2021/01/photo.jpg")).unwrap();
        let loc = GeoLocation::non_zero(-33.8688, 151.2093);
        writer(&tool).apply(&media, &resolved(loc));

        let tags = &tool.recorded()[0].1;
        assert!(!tags.contains("MediaCreateDate"));
        assert_eq!(tags.get("GPSLatitude"), Some("-33.8688"));
        assert_eq!(tags.get("GPSLatitudeRef"), Some("S"));
        assert_eq!(tags.get("GPSLongitude"), Some("151.2093"));
        assert_eq!(tags.get("GPSLongitudeRef"), Some("E"));
    }

    #[test]
    fn test_webp_and_unresolved_are_skipped() {
        let tool = Arc::new(FakeTool::default());
        let webp = MediaFile::from_path(Path::new("/dest/2021/01/sticker.webp")).unwrap();
        assert_eq!(writer(&tool).apply(&webp, &resolved(None)), TagOutcome::Skipped);

        let heic = MediaFile::from_path(Path::new("/dest/undefined/mystery.heic")).unwrap();
        assert_eq!(
            writer(&tool).apply(&heic, &ResolutionResult::unresolved()),
            TagOutcome::Skipped
        );
        assert!(tool.recorded().is_empty());
    }

    #[test]
    fn test_reencode_then_retry_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        image::RgbImage::new(4, 4).save(&path).unwrap();

        let tool = Arc::new(FakeTool::default().fail_writes("corrupt.png", 1));
        let media = MediaFile::from_path(&path).unwrap();
        assert_eq!(
            writer(&tool).apply(&media, &resolved(None)),
            TagOutcome::WrittenAfterReencode
        );

        let writes = tool.recorded();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1, writes[1].1);
    }

    #[test]
    fn test_minimal_fallback_when_reencode_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.jpg");
        fs::write(&path, b"not decodable").unwrap();

        let tool = Arc::new(FakeTool::default().fail_writes("corrupt.jpg", 1));
        let media = MediaFile::from_path(&path).unwrap();
        let loc = GeoLocation::non_zero(10.0, 20.0);
        assert_eq!(
            writer(&tool).apply(&media, &resolved(loc)),
            TagOutcome::WrittenMinimal
        );

        let writes = tool.recorded();
        assert_eq!(writes.len(), 2);
        let minimal = &writes[1].1;
        assert_eq!(minimal.get("DateTimeOriginal"), Some("2021:01:01 00:00:00"));
        assert!(!minimal.contains("AllDates"));
        assert_eq!(minimal.get("GPSLatitudeRef"), Some("N"));
    }

    #[test]
    fn test_all_levels_fail() {
        let tool = Arc::new(FakeTool::default().fail_writes("clip.mov", 5));
        let media = MediaFile::from_path(Path::new("/dest/2021/01/clip.mov")).unwrap();
        assert_eq!(writer(&tool).apply(&media, &resolved(None)), TagOutcome::Failed);
        // Video: no re-encode attempt, straight to the minimal request.
        assert_eq!(tool.recorded().len(), 2);
    }
}
