use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use anyhow::Context;
use serde::Serialize;

use crate::date::{ResolutionChain, ResolutionMethod, ResolutionResult};
use crate::media::MediaFile;
use crate::router::{self, DestinationLayout};
use crate::writer::{MetadataWriter, TagOutcome};
use crate::{ProgressCallback, ThrottledProgress};

/// Workers: nine tenths of the available CPUs, at least one.
pub fn worker_count() -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    (cpus * 9 / 10).max(1)
}

/// Where a file ended up and which log it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Success(PathBuf),
    Failure(PathBuf),
}

/// Message sent from a worker to the collector, one per input file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: PathBuf,
    pub method: ResolutionMethod,
    pub tagging: Option<TagOutcome>,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MethodCounts {
    pub exif: u64,
    pub json: u64,
    pub probe: u64,
    pub filename: u64,
    pub none: u64,
}

impl MethodCounts {
    fn record(&mut self, method: ResolutionMethod) {
        let slot = match method {
            ResolutionMethod::Exif => &mut self.exif,
            ResolutionMethod::Json => &mut self.json,
            ResolutionMethod::Probe => &mut self.probe,
            ResolutionMethod::Filename => &mut self.filename,
            ResolutionMethod::None => &mut self.none,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagCounts {
    pub written: u64,
    pub after_reencode: u64,
    pub minimal: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl TagCounts {
    fn record(&mut self, outcome: TagOutcome) {
        let slot = match outcome {
            TagOutcome::Written => &mut self.written,
            TagOutcome::WrittenAfterReencode => &mut self.after_reencode,
            TagOutcome::WrittenMinimal => &mut self.minimal,
            TagOutcome::Skipped => &mut self.skipped,
            TagOutcome::Failed => &mut self.failed,
        };
        *slot += 1;
    }
}

/// Everything the collector gathered over one run.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub successes: Vec<PathBuf>,
    pub failures: Vec<PathBuf>,
    pub methods: MethodCounts,
    pub tagging: TagCounts,
}

impl RunOutcome {
    fn record(&mut self, report: FileReport) {
        self.methods.record(report.method);
        if let Some(tagging) = report.tagging {
            self.tagging.record(tagging);
        }
        match report.disposition {
            Disposition::Success(path) => self.successes.push(path),
            Disposition::Failure(path) => self.failures.push(path),
        }
    }
}

/// resolve -> route -> move -> tag, per file, across a worker pool.
pub struct Pipeline {
    chain: ResolutionChain,
    writer: MetadataWriter,
    layout: DestinationLayout,
    set_mtime: bool,
}

impl Pipeline {
    pub fn new(chain: ResolutionChain, writer: MetadataWriter, layout: DestinationLayout) -> Self {
        Self {
            chain,
            writer,
            layout,
            set_mtime: false,
        }
    }

    /// Stamp moved files' mtime with the resolved timestamp.
    pub fn with_mtime(mut self, set_mtime: bool) -> Self {
        self.set_mtime = set_mtime;
        self
    }

    pub fn layout(&self) -> &DestinationLayout {
        &self.layout
    }

    /// Process every file; each input yields exactly one report.
    pub fn run(
        &self,
        files: Vec<MediaFile>,
        progress: &ProgressCallback<'_>,
    ) -> anyhow::Result<RunOutcome> {
        let total = files.len() as u64;
        let workers = worker_count();
        log::info!("Processing {} files with {} workers", total, workers);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("gpsort-worker-{}", i))
            .build()
            .context("building worker pool")?;

        let (tx, rx) = mpsc::channel::<FileReport>();

        std::thread::scope(|s| {
            let collector = s.spawn(move || collect(rx, total, progress));

            pool.scope(|ps| {
                for media in files {
                    let tx = tx.clone();
                    ps.spawn(move |_| {
                        let report = self.run_task(media);
                        // Receiver outlives every worker.
                        let _ = tx.send(report);
                    });
                }
            });
            drop(tx);

            collector
                .join()
                .map_err(|_| anyhow::anyhow!("outcome collector panicked"))
        })
    }

    /// One file's task. Errors and panics become a failure report.
    fn run_task(&self, media: MediaFile) -> FileReport {
        let source = media.path.clone();

        let placed = panic::catch_unwind(AssertUnwindSafe(|| self.place(&media)));
        let (moved, result) = match placed {
            Ok(Ok(placed)) => placed,
            Ok(Err(e)) => {
                log::error!("Failed to process {}: {:#}", source.display(), e);
                return FileReport {
                    source: source.clone(),
                    method: ResolutionMethod::None,
                    tagging: None,
                    disposition: Disposition::Failure(source),
                };
            }
            Err(_) => {
                log::error!("Processing {} panicked", source.display());
                return FileReport {
                    source: source.clone(),
                    method: ResolutionMethod::None,
                    tagging: None,
                    disposition: Disposition::Failure(source),
                };
            }
        };

        if result.timestamp().is_none() {
            return FileReport {
                source,
                method: result.method(),
                tagging: None,
                disposition: Disposition::Failure(moved.path),
            };
        }

        // Tag failures do not demote the outcome: the file has already moved.
        let tagging = panic::catch_unwind(AssertUnwindSafe(|| self.tag(&moved, &result)))
            .unwrap_or_else(|_| {
                log::error!("Tagging {} panicked", moved.path.display());
                TagOutcome::Failed
            });

        FileReport {
            source,
            method: result.method(),
            tagging: Some(tagging),
            disposition: Disposition::Success(moved.path),
        }
    }

    /// Resolve, route and physically move one file.
    fn place(&self, media: &MediaFile) -> anyhow::Result<(MediaFile, ResolutionResult)> {
        let result = self.chain.resolve(media);
        let dest = self.layout.destination_for(&result, &media.filename);
        router::move_file(&media.path, &dest)?;
        log::debug!("{} -> {} ({})", media.path.display(), dest.display(), result.method());
        Ok((media.relocated(dest), result))
    }

    fn tag(&self, moved: &MediaFile, result: &ResolutionResult) -> TagOutcome {
        let outcome = self.writer.apply(moved, result);
        if self.set_mtime {
            if let Some(ts) = result.timestamp() {
                if let Some(local) = ts.and_local_timezone(chrono::Local).single() {
                    let ft = filetime::FileTime::from_unix_time(local.timestamp(), 0);
                    filetime::set_file_mtime(&moved.path, ft).ok();
                }
            }
        }
        outcome
    }
}

fn collect(rx: Receiver<FileReport>, total: u64, progress: &ProgressCallback<'_>) -> RunOutcome {
    let tp = ThrottledProgress::new(progress);
    let mut outcome = RunOutcome::default();
    for (done, report) in rx.iter().enumerate() {
        let name = report
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        outcome.record(report);
        tp.report("sort", done as u64, total, &name);
    }
    outcome
}

/// Write one path per line, replacing any previous log.
pub fn write_log(path: &Path, entries: &[PathBuf]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for entry in entries {
        writeln!(out, "{}", entry.display())?;
    }
    out.flush()?;
    Ok(())
}
