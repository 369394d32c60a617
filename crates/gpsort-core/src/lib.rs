pub mod date;
pub mod exiftool;
pub mod media;
pub mod pipeline;
pub mod prune;
pub mod router;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use date::{FilenameFallback, ResolutionChain, StageKind, DEFAULT_STAGES};
use exiftool::{ExifTool, MetadataTool};
use pipeline::{MethodCounts, Pipeline, TagCounts};
use router::DestinationLayout;
use writer::MetadataWriter;

pub const SUCCESS_LOG_NAME: &str = "success_log.txt";
pub const FAILURE_LOG_NAME: &str = "fail_log.txt";

fn default_stages() -> Vec<StageKind> {
    DEFAULT_STAGES.to_vec()
}

fn default_exiftool() -> String {
    "exiftool".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortOptions {
    /// Exported tree to read from
    pub source: PathBuf,
    /// Root of the confirmed bucket
    pub destination: PathBuf,
    /// Defaults to `<destination>/check`
    #[serde(default)]
    pub review_dir: Option<PathBuf>,
    /// Defaults to `<destination>/undefined`
    #[serde(default)]
    pub undefined_dir: Option<PathBuf>,
    /// Defaults to `<source>/success_log.txt`
    #[serde(default)]
    pub success_log: Option<PathBuf>,
    /// Defaults to `<source>/fail_log.txt`
    #[serde(default)]
    pub failure_log: Option<PathBuf>,
    #[serde(default = "default_stages")]
    pub stages: Vec<StageKind>,
    #[serde(default)]
    pub filename_fallback: FilenameFallback,
    #[serde(default = "default_exiftool")]
    pub exiftool: String,
    #[serde(default = "default_true")]
    pub set_mtime: bool,
}

impl SortOptions {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            review_dir: None,
            undefined_dir: None,
            success_log: None,
            failure_log: None,
            stages: default_stages(),
            filename_fallback: FilenameFallback::default(),
            exiftool: default_exiftool(),
            set_mtime: true,
        }
    }

    /// Load options from a JSON file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
    }

    /// Bucket roots, made absolute.
    pub fn layout(&self) -> anyhow::Result<DestinationLayout> {
        let dest = absolute(&self.destination)?;
        let defaults = DestinationLayout::under(&dest);
        Ok(DestinationLayout {
            review: match &self.review_dir {
                Some(p) => absolute(p)?,
                None => defaults.review,
            },
            undefined: match &self.undefined_dir {
                Some(p) => absolute(p)?,
                None => defaults.undefined,
            },
            confirmed: defaults.confirmed,
        })
    }

    /// (success, failure) log paths, made absolute.
    pub fn log_paths(&self) -> anyhow::Result<(PathBuf, PathBuf)> {
        let source = absolute(&self.source)?;
        let success = match &self.success_log {
            Some(p) => absolute(p)?,
            None => source.join(SUCCESS_LOG_NAME),
        };
        let failure = match &self.failure_log {
            Some(p) => absolute(p)?,
            None => source.join(FAILURE_LOG_NAME),
        };
        Ok((success, failure))
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub total_media: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub methods: MethodCounts,
    pub tagging: TagCounts,
    pub success_log: PathBuf,
    pub failure_log: PathBuf,
}

/// Progress sink: `(stage, index, total, message)`. May borrow from the caller.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Rate-limits a [`ProgressCallback`] to one call per 200ms.
///
/// `current` is the zero-based index of the item just finished; in the sort
/// stage the collector passes the number of reports received so far, minus one.
/// The call for the last item always goes through.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Build the resolution chain described by `options`.
pub fn build_chain(options: &SortOptions, tool: Arc<dyn MetadataTool>) -> ResolutionChain {
    ResolutionChain::from_kinds(&options.stages, tool, options.filename_fallback)
}

/// Run the full pipeline with the exiftool subprocess.
pub fn process(
    options: &SortOptions,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let tool: Arc<dyn MetadataTool> = Arc::new(ExifTool::new(options.exiftool.clone()));
    process_with_tool(options, tool, progress_callback)
}

/// Run the full pipeline against any tag tool.
pub fn process_with_tool(
    options: &SortOptions,
    tool: Arc<dyn MetadataTool>,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let layout = options.layout()?;
    let (success_log, failure_log) = options.log_paths()?;

    let files = media::scan_source(&options.source)?;
    log::info!("Found {} media files under {}", files.len(), options.source.display());

    let chain = build_chain(options, tool.clone());
    let pipeline = Pipeline::new(chain, MetadataWriter::new(tool), layout)
        .with_mtime(options.set_mtime);

    let total_media = files.len() as u64;
    let outcome = pipeline.run(files, progress_callback)?;

    pipeline::write_log(&success_log, &outcome.successes)?;
    pipeline::write_log(&failure_log, &outcome.failures)?;

    Ok(ProcessResult {
        total_media,
        succeeded: outcome.successes.len() as u64,
        failed: outcome.failures.len() as u64,
        methods: outcome.methods,
        tagging: outcome.tagging,
        success_log,
        failure_log,
    })
}
