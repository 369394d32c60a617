use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

/// Errors from the external metadata tool boundary.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("re-encode of {path} failed: {source}")]
    Reencode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// An ordered set of `-Tag=value` assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, String)>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, tag: &str, value: impl Into<String>) -> &mut Self {
        self.entries.push((tag.to_string(), value.into()));
        self
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Command-line form: `-Tag=value` per entry.
    pub fn to_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(tag, value)| format!("-{}={}", tag, value))
            .collect()
    }
}

/// Capability to read and write embedded metadata of a file at a path.
pub trait MetadataTool: Send + Sync {
    /// Return the tool's "Key: Value" report for the requested tags.
    fn read_tags(&self, path: &Path, tags: &[&str]) -> Result<String, ToolError>;

    /// Apply `tags` in place, without keeping a backup copy.
    fn write_tags(&self, path: &Path, tags: &TagSet) -> Result<(), ToolError>;
}

/// `exiftool` run as a subprocess.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: String,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Installed version, or `None` if the program cannot be run.
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.program).arg("-ver").output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run(&self, args: &[String], path: &Path) -> Result<String, ToolError> {
        let output = Command::new(&self.program)
            .args(args)
            .arg(path)
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MetadataTool for ExifTool {
    fn read_tags(&self, path: &Path, tags: &[&str]) -> Result<String, ToolError> {
        let args: Vec<String> = tags.iter().map(|t| format!("-{}", t)).collect();
        self.run(&args, path)
    }

    fn write_tags(&self, path: &Path, tags: &TagSet) -> Result<(), ToolError> {
        let mut args = tags.to_args();
        args.push("-overwrite_original".to_string());
        self.run(&args, path).map(|_| ())
    }
}
