pub mod exif;
pub mod guess;
pub mod json;
pub mod probe;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::exiftool::MetadataTool;
use crate::media::MediaFile;

/// Which stage produced the winning timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResolutionMethod {
    Exif,
    Json,
    Probe,
    Filename,
    None,
}

impl ResolutionMethod {
    /// Methods backed by recorded metadata rather than a guess.
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Exif | Self::Json | Self::Probe)
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exif => "EXIF",
            Self::Json => "JSON",
            Self::Probe => "PROBE",
            Self::Filename => "FILENAME",
            Self::None => "NONE",
        };
        f.write_str(s)
    }
}

/// Signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoLocation {
    /// (0, 0) is how exports encode "no location".
    pub fn non_zero(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude == 0.0 && longitude == 0.0 {
            None
        } else {
            Some(Self { latitude, longitude })
        }
    }

    pub fn latitude_ref(&self) -> &'static str {
        if self.latitude >= 0.0 {
            "N"
        } else {
            "S"
        }
    }

    pub fn longitude_ref(&self) -> &'static str {
        if self.longitude >= 0.0 {
            "E"
        } else {
            "W"
        }
    }
}

/// What a single stage found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub timestamp: NaiveDateTime,
    pub location: Option<GeoLocation>,
}

impl Resolution {
    pub fn at(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            location: None,
        }
    }
}

/// Outcome of the whole chain. A timestamp is present iff the method is not `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolutionResult {
    timestamp: Option<NaiveDateTime>,
    location: Option<GeoLocation>,
    method: ResolutionMethod,
}

impl ResolutionResult {
    /// A timestamp reported under [`ResolutionMethod::None`] is discarded.
    pub fn resolved(method: ResolutionMethod, resolution: Resolution) -> Self {
        if method == ResolutionMethod::None {
            log::warn!(
                "Dropping timestamp {} with no resolution method",
                resolution.timestamp
            );
            return Self::unresolved();
        }
        Self {
            timestamp: Some(resolution.timestamp),
            location: resolution.location,
            method,
        }
    }

    pub fn unresolved() -> Self {
        Self {
            timestamp: None,
            location: None,
            method: ResolutionMethod::None,
        }
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    pub fn location(&self) -> Option<GeoLocation> {
        self.location
    }

    pub fn method(&self) -> ResolutionMethod {
        self.method
    }
}

/// One strategy for finding a file's capture moment.
pub trait Resolver: Send + Sync {
    fn method(&self) -> ResolutionMethod;

    /// `None` means "declined"; stages never fail outward.
    fn resolve(&self, media: &MediaFile) -> Option<Resolution>;
}

/// Stage identifiers used to configure the chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Exif,
    Json,
    Probe,
    Filename,
}

pub const DEFAULT_STAGES: &[StageKind] = &[
    StageKind::Exif,
    StageKind::Json,
    StageKind::Probe,
    StageKind::Filename,
];

/// What the filename stage does when no pattern yields a usable date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FilenameFallback {
    /// Decline, leaving the file unresolved.
    #[default]
    Unresolved,
    /// Use 2005-01-01 00:00:00.
    DefaultDate,
}

/// Ordered waterfall of stages; the first stage with a timestamp wins.
pub struct ResolutionChain {
    stages: Vec<Box<dyn Resolver>>,
}

impl ResolutionChain {
    pub fn new(stages: Vec<Box<dyn Resolver>>) -> Self {
        Self { stages }
    }

    /// Build the chain for the configured stage order.
    pub fn from_kinds(
        kinds: &[StageKind],
        tool: Arc<dyn MetadataTool>,
        fallback: FilenameFallback,
    ) -> Self {
        let stages = kinds
            .iter()
            .map(|kind| -> Box<dyn Resolver> {
                match kind {
                    StageKind::Exif => Box::new(exif::ExifStage),
                    StageKind::Json => Box::new(json::SidecarStage),
                    StageKind::Probe => Box::new(probe::ProbeStage::new(tool.clone())),
                    StageKind::Filename => Box::new(guess::FilenameStage::new(fallback)),
                }
            })
            .collect();
        Self::new(stages)
    }

    pub fn resolve(&self, media: &MediaFile) -> ResolutionResult {
        for stage in &self.stages {
            let method = stage.method();
            if let Some(resolution) = stage.resolve(media) {
                log::debug!(
                    "{}: resolved by {} as {}",
                    media.path.display(),
                    method,
                    resolution.timestamp
                );
                return ResolutionResult::resolved(method, resolution);
            }
            log::trace!("{}: {} declined", media.path.display(), method);
        }
        ResolutionResult::unresolved()
    }
}
