use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use gpsort_core::date::{FilenameFallback, ResolutionResult, StageKind};
use gpsort_core::exiftool::{ExifTool, MetadataTool};
use gpsort_core::media::MediaFile;
use gpsort_core::{SortOptions, ThrottledProgress};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(
    name = "gpsort",
    version,
    about = "Resolve capture dates for an exported photo tree and file it by year/month"
)]
struct Cli {
    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, move and tag every media file under the source tree
    Sort(SortArgs),
    /// Print how each file's timestamp would be resolved, without moving anything
    Resolve {
        /// Media files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, value_delimiter = ',')]
        stages: Option<Vec<StageKind>>,

        #[arg(long, value_enum)]
        filename_fallback: Option<FilenameFallback>,

        #[arg(long, default_value = "exiftool")]
        exiftool: String,
    },
    /// Delete files from TARGET that also exist at the same relative path under ORIGINAL
    Prune {
        #[arg(long)]
        original: PathBuf,

        #[arg(long)]
        target: PathBuf,

        /// Actually delete (default is a dry run)
        #[arg(long)]
        execute: bool,

        #[arg(long, default_value = "deleted_files.log")]
        log: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct SortArgs {
    /// Exported media tree
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Destination root (YYYY/MM folders are created here)
    #[arg(short, long)]
    dest: Option<PathBuf>,

    /// Folder for filename-guessed dates (default: <dest>/check)
    #[arg(long)]
    review_dir: Option<PathBuf>,

    /// Folder for unresolved files (default: <dest>/undefined)
    #[arg(long)]
    undefined_dir: Option<PathBuf>,

    /// Success log (default: <source>/success_log.txt)
    #[arg(long)]
    success_log: Option<PathBuf>,

    /// Failure log (default: <source>/fail_log.txt)
    #[arg(long)]
    failure_log: Option<PathBuf>,

    /// Resolution stages in precedence order
    #[arg(long, value_enum, value_delimiter = ',')]
    stages: Option<Vec<StageKind>>,

    /// What the filename stage does when nothing matches
    #[arg(long, value_enum)]
    filename_fallback: Option<FilenameFallback>,

    /// exiftool program to run
    #[arg(long)]
    exiftool: Option<String>,

    /// Leave file modification times alone
    #[arg(long)]
    no_mtime: bool,

    /// JSON options file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Sort(args) => {
            let json = args.json;
            let options = merge_options(args)?;
            run_sort(&options, json)
        }
        Commands::Resolve {
            files,
            stages,
            filename_fallback,
            exiftool,
        } => run_resolve(files, stages, filename_fallback, exiftool),
        Commands::Prune {
            original,
            target,
            execute,
            log,
        } => run_prune(&original, &target, &log, execute),
    }
}

/// Options from `--config` (if any) with command-line flags layered on top.
fn merge_options(args: SortArgs) -> anyhow::Result<SortOptions> {
    let mut options = match (&args.config, &args.source, &args.dest) {
        (Some(path), _, _) => SortOptions::from_json_file(path)?,
        (None, Some(source), Some(dest)) => SortOptions::new(source, dest),
        (None, _, _) => anyhow::bail!("--source and --dest are required without --config"),
    };
    if let Some(v) = args.source {
        options.source = v;
    }
    if let Some(v) = args.dest {
        options.destination = v;
    }
    if args.review_dir.is_some() {
        options.review_dir = args.review_dir;
    }
    if args.undefined_dir.is_some() {
        options.undefined_dir = args.undefined_dir;
    }
    if args.success_log.is_some() {
        options.success_log = args.success_log;
    }
    if args.failure_log.is_some() {
        options.failure_log = args.failure_log;
    }
    if let Some(v) = args.stages {
        options.stages = v;
    }
    if let Some(v) = args.filename_fallback {
        options.filename_fallback = v;
    }
    if let Some(v) = args.exiftool {
        options.exiftool = v;
    }
    if args.no_mtime {
        options.set_mtime = false;
    }
    Ok(options)
}

fn check_exiftool(program: &str) {
    match ExifTool::new(program).version() {
        Some(version) => log::info!("Found exiftool version: {}", version),
        None => log::warn!(
            "{} could not be run; probing and tag writing will fail (files are still moved)",
            program
        ),
    }
}

fn run_sort(options: &SortOptions, json: bool) -> anyhow::Result<()> {
    let t_total = std::time::Instant::now();
    check_exiftool(&options.exiftool);

    let pb = progress_bar();
    let result = gpsort_core::process(options, &|stage, current, total, message| {
        pb.set_length(total);
        pb.set_prefix(stage.to_string());
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    })?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    eprintln!(
        "Done! {} media files, {} succeeded, {} failed ({:.2}s)",
        result.total_media,
        result.succeeded,
        result.failed,
        t_total.elapsed().as_secs_f64()
    );
    eprintln!(
        "  by method: EXIF {}, JSON {}, PROBE {}, FILENAME {}, NONE {}",
        result.methods.exif,
        result.methods.json,
        result.methods.probe,
        result.methods.filename,
        result.methods.none
    );
    if result.tagging.failed > 0 {
        eprintln!(
            "  {} file(s) moved but could not be tagged (still listed as successes)",
            result.tagging.failed
        );
    }
    eprintln!("  success log: {}", result.success_log.display());
    eprintln!("  failure log: {}", result.failure_log.display());
    Ok(())
}

fn run_resolve(
    files: Vec<PathBuf>,
    stages: Option<Vec<StageKind>>,
    filename_fallback: Option<FilenameFallback>,
    exiftool: String,
) -> anyhow::Result<()> {
    let mut options = SortOptions::new(".", ".");
    if let Some(v) = stages {
        options.stages = v;
    }
    if let Some(v) = filename_fallback {
        options.filename_fallback = v;
    }
    let tool: Arc<dyn MetadataTool> = Arc::new(ExifTool::new(exiftool));
    let chain = gpsort_core::build_chain(&options, tool);

    for path in files {
        let Some(media) = MediaFile::from_path(&path) else {
            log::warn!("Unsupported file type: {}", path.display());
            continue;
        };
        println!("{}", resolve_line(&chain.resolve(&media), &path));
    }
    Ok(())
}

/// `METHOD<TAB>timestamp<TAB>lat,lon<TAB>path`, with `-` for missing values.
fn resolve_line(result: &ResolutionResult, path: &Path) -> String {
    let timestamp = result
        .timestamp()
        .map_or_else(|| "-".to_string(), |ts| ts.to_string());
    let location = result
        .location()
        .map_or_else(|| "-".to_string(), |l| format!("{},{}", l.latitude, l.longitude));
    format!("{}\t{}\t{}\t{}", result.method(), timestamp, location, path.display())
}

fn run_prune(original: &Path, target: &Path, log: &Path, execute: bool) -> anyhow::Result<()> {
    let pb = progress_bar();
    let callback = |stage: &str, current: u64, total: u64, message: &str| {
        pb.set_length(total);
        pb.set_prefix(stage.to_string());
        pb.set_position(current + 1);
        pb.set_message(message.to_string());
    };
    let tp = ThrottledProgress::new(&callback);
    let report = gpsort_core::prune::prune(original, target, log, !execute, &tp)?;
    pb.finish_and_clear();

    if execute {
        eprintln!(
            "Deleted {} of {} file(s), {} failed",
            report.deleted.len(),
            report.candidates.len(),
            report.failed.len()
        );
        if !report.deleted.is_empty() {
            eprintln!("Deleted files logged to {}", log.display());
        }
    } else {
        eprintln!(
            "{} file(s) would be deleted; list written to {}",
            report.candidates.len(),
            log.display()
        );
        eprintln!("Dry run: nothing deleted (pass --execute to delete)");
    }
    Ok(())
}
