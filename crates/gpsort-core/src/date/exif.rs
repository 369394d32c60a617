use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{In, Reader, Tag};

use super::{Resolution, ResolutionMethod, Resolver};
use crate::media::MediaFile;

/// Reads DateTimeOriginal from the file's embedded EXIF block.
pub struct ExifStage;

impl Resolver for ExifStage {
    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Exif
    }

    fn resolve(&self, media: &MediaFile) -> Option<Resolution> {
        extract_exif_date(&media.path).map(Resolution::at)
    }
}

/// EXIF datetimes have no timezone info - they are local time as-is.
pub fn extract_exif_date(path: &Path) -> Option<NaiveDateTime> {
    let file = File::open(path).ok()?;
    let exif = Reader::new()
        .read_from_container(&mut BufReader::new(file))
        .ok()?;

    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    parse_exif_datetime(&field.display_value().to_string())
}

/// kamadak renders ASCII datetimes with dashes; normalize back to EXIF form.
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s.trim().replace('-', ":").replace('/', ":");
    NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S").ok()
}
