use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::date::{ResolutionMethod, ResolutionResult};

/// Destination partition, by confidence in the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Confirmed,
    Review,
    Undefined,
}

impl Bucket {
    pub fn for_method(method: ResolutionMethod) -> Self {
        match method {
            ResolutionMethod::Exif | ResolutionMethod::Json | ResolutionMethod::Probe => {
                Self::Confirmed
            }
            ResolutionMethod::Filename => Self::Review,
            ResolutionMethod::None => Self::Undefined,
        }
    }
}

/// Roots of the three buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationLayout {
    pub confirmed: PathBuf,
    pub review: PathBuf,
    pub undefined: PathBuf,
}

impl DestinationLayout {
    /// `dest`, `dest/check`, `dest/undefined`.
    pub fn under(dest: &Path) -> Self {
        Self {
            confirmed: dest.to_path_buf(),
            review: dest.join("check"),
            undefined: dest.join("undefined"),
        }
    }

    /// Directory a file with this resolution belongs in.
    pub fn directory_for(&self, result: &ResolutionResult) -> PathBuf {
        let root = match Bucket::for_method(result.method()) {
            Bucket::Confirmed => &self.confirmed,
            Bucket::Review => &self.review,
            Bucket::Undefined => return self.undefined.clone(),
        };
        match result.timestamp() {
            Some(ts) => root
                .join(ts.year().to_string())
                .join(format!("{:02}", ts.month())),
            None => self.undefined.clone(),
        }
    }

    pub fn destination_for(
        &self,
        result: &ResolutionResult,
        filename: impl AsRef<Path>,
    ) -> PathBuf {
        self.directory_for(result).join(filename)
    }
}

/// Move `src` to `dest`, creating parents and replacing an existing file.
/// Falls back to copy + remove when rename fails.
pub fn move_file(src: &Path, dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if dest.is_file() && src != dest {
        fs::remove_file(dest).with_context(|| format!("replacing {}", dest.display()))?;
    }

    if let Err(rename_err) = fs::rename(src, dest) {
        log::debug!("rename {} failed ({}), copying", src.display(), rename_err);
        fs::copy(src, dest)
            .with_context(|| format!("moving {} to {}", src.display(), dest.display()))?;
        fs::remove_file(src).with_context(|| format!("removing {}", src.display()))?;
    }
    Ok(())
}
