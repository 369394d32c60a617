//! Remove from a target tree every file that also exists, at the same relative
//! path, under an original tree. Paths only; contents are never compared.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use crate::pipeline::write_log;
use crate::ThrottledProgress;

#[derive(Debug, Default)]
pub struct PruneReport {
    pub candidates: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// `target/<rel>` for every file `original/<rel>` whose counterpart exists.
pub fn find_candidates(
    original: &Path,
    target: &Path,
    progress: &ThrottledProgress,
) -> anyhow::Result<Vec<PathBuf>> {
    if !original.is_dir() {
        anyhow::bail!("original directory {} does not exist", original.display());
    }

    let files: Vec<PathBuf> = WalkDir::new(original)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    let total = files.len() as u64;

    let mut candidates = Vec::new();
    for (i, file) in files.iter().enumerate() {
        let rel = file.strip_prefix(original)?;
        let counterpart = target.join(rel);
        if counterpart.is_file() {
            log::info!("Delete candidate: {}", counterpart.display());
            candidates.push(counterpart);
        }
        progress.report("prune-scan", i as u64, total, "Checking files");
    }
    Ok(candidates)
}

/// Dry-run logs the candidates; otherwise deletes them and logs what was deleted.
pub fn prune(
    original: &Path,
    target: &Path,
    log_path: &Path,
    dry_run: bool,
    progress: &ThrottledProgress,
) -> anyhow::Result<PruneReport> {
    let candidates = find_candidates(original, target, progress)?;
    let mut report = PruneReport::default();

    if dry_run {
        write_log(log_path, &candidates)?;
        report.candidates = candidates;
        return Ok(report);
    }

    let total = candidates.len() as u64;
    for (i, file) in candidates.iter().enumerate() {
        match fs::remove_file(file).with_context(|| format!("deleting {}", file.display())) {
            Ok(()) => report.deleted.push(file.clone()),
            Err(e) => {
                log::warn!("{:#}", e);
                report.failed.push((file.clone(), format!("{:#}", e)));
            }
        }
        progress.report("prune-delete", i as u64, total, "Deleting");
    }

    if !report.deleted.is_empty() {
        write_log(log_path, &report.deleted)?;
    }
    report.candidates = candidates;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn quiet(_: &str, _: u64, _: u64, _: &str) {}

    fn tree(root: &Path, files: &[&str]) {
        for f in files {
            let p = root.join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, b"x").unwrap();
        }
    }

    #[test]
    fn test_dry_run_deletes_nothing() {
        let dir = tempdir().unwrap();
        let (orig, target) = (dir.path().join("orig"), dir.path().join("nas"));
        tree(&orig, &["2019/03/a.jpg", "2019/04/b.jpg"]);
        tree(&target, &["2019/03/a.jpg", "2019/04/other.jpg"]);
        let log = dir.path().join("deleted_files.log");

        let progress = ThrottledProgress::new(&quiet);
        let report = prune(&orig, &target, &log, true, &progress).unwrap();
        assert_eq!(report.candidates, vec![target.join("2019/03/a.jpg")]);
        assert!(report.deleted.is_empty());
        assert!(target.join("2019/03/a.jpg").exists());
        assert_eq!(
            fs::read_to_string(&log).unwrap().trim(),
            target.join("2019/03/a.jpg").display().to_string()
        );
    }

    #[test]
    fn test_execute_deletes_matches_only() {
        let dir = tempdir().unwrap();
        let (orig, target) = (dir.path().join("orig"), dir.path().join("nas"));
        tree(&orig, &["check/2019/03/a.jpg", "b.mp4"]);
        tree(&target, &["check/2019/03/a.jpg", "b.mp4", "keep.png"]);
        let log = dir.path().join("deleted_files.log");

        let progress = ThrottledProgress::new(&quiet);
        let report = prune(&orig, &target, &log, false, &progress).unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert!(report.failed.is_empty());
        assert!(!target.join("b.mp4").exists());
        assert!(target.join("keep.png").exists());
        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_missing_original_is_error() {
        let dir = tempdir().unwrap();
        let result = prune(
            &dir.path().join("nope"),
            dir.path(),
            &dir.path().join("log"),
            true,
            &ThrottledProgress::new(&|_, _, _, _| {}),
        );
        assert!(result.is_err());
    }
}
