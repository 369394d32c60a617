use std::borrow::Cow;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Extensions (lowercase, without the dot) picked up from the source tree.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "3gp", "dng", "gif", "heic", "jpeg", "jpg", "mov", "mp4", "png", "webp",
];

/// Formats the tagging tool cannot write to.
const UNTAGGABLE_EXTENSIONS: &[&str] = &["webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Where the file currently lives
    pub path: PathBuf,
    /// Just the filename, byte-exact
    pub filename: OsString,
    /// Lowercased extension without the dot
    pub extension: String,
}

impl MediaFile {
    /// Build from a path, or `None` when the extension is not supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_os_string();
        let extension = path.extension()?.to_str()?.to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            filename,
            extension,
        })
    }

    /// Filename for matching and display; invalid UTF-8 becomes U+FFFD.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        self.filename.to_string_lossy()
    }

    /// Video containers get container-level date tags in addition to AllDates.
    pub fn is_video(&self) -> bool {
        mime_guess::from_ext(&self.extension)
            .first()
            .map_or(false, |mime| mime.type_() == mime_guess::mime::VIDEO)
    }

    pub fn is_image(&self) -> bool {
        mime_guess::from_ext(&self.extension)
            .first()
            .map_or(false, |mime| mime.type_() == mime_guess::mime::IMAGE)
    }

    pub fn is_taggable(&self) -> bool {
        !UNTAGGABLE_EXTENSIONS.contains(&self.extension.as_str())
    }

    /// Same file after it has been moved to `dest`.
    pub fn relocated(&self, dest: PathBuf) -> Self {
        Self {
            path: dest,
            filename: self.filename.clone(),
            extension: self.extension.clone(),
        }
    }
}

/// Recursively collect supported media files under `root`.
/// Unreadable entries are skipped; the returned list is sorted by path.
pub fn scan_source(root: &Path) -> anyhow::Result<Vec<MediaFile>> {
    if !root.is_dir() {
        anyhow::bail!("source directory {} does not exist", root.display());
    }

    let mut files: Vec<MediaFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| MediaFile::from_path(entry.path()))
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
