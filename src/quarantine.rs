//! Quarantine: move failed inputs aside with a structured error report.
//!
//! A fatal error must leave the operator two things: the untouched input
//! (renamed so a retry loop cannot pick it up again) and a machine-readable
//! account of what went wrong. The report is a pretty-printed JSON sibling
//! under `{quarantine_dir}/reports/` carrying the failure category,
//! stage, recovery hints, and the config snapshot relevant to the failure.
//!
//! Moves prefer an atomic rename; across filesystems they fall back to
//! copy + fsync + delete so a crash mid-move can duplicate the input but
//! never lose it.

use crate::config::Config;
use crate::error::SeparatorError;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// Persisted JSON sibling of a quarantined document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub quarantine_path: PathBuf,
    pub stage_at_failure: String,
    pub reason_category: String,
    pub detail: String,
    pub recovery_hints: Vec<String>,
    pub config_snapshot: serde_json::Value,
}

/// Move `input_path` into quarantine and write its report.
///
/// Returns the quarantine path of the moved input.
pub fn quarantine_document(
    input_path: &Path,
    stage: &str,
    error: &SeparatorError,
    config: &Config,
) -> Result<PathBuf, SeparatorError> {
    let basename = input_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "input.pdf".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let quarantine_path = config
        .quarantine_dir
        .join(format!("failed_{}_{}", stamp, basename));

    std::fs::create_dir_all(&config.quarantine_dir).map_err(|e| fs_err(&config.quarantine_dir, e))?;
    let report_dir = config.report_dir();
    std::fs::create_dir_all(&report_dir).map_err(|e| fs_err(&report_dir, e))?;

    move_file(input_path, &quarantine_path)?;

    let report = ErrorReport {
        timestamp: Utc::now(),
        original_path: input_path.to_path_buf(),
        quarantine_path: quarantine_path.clone(),
        stage_at_failure: stage.to_string(),
        reason_category: error.category().to_string(),
        detail: error.to_string(),
        recovery_hints: error.recovery_hints(),
        config_snapshot: config.snapshot(),
    };

    let report_path = report_dir.join(format!("failed_{}_{}.json", stamp, basename));
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| SeparatorError::Internal(format!("report serialization: {}", e)))?;
    std::fs::write(&report_path, json).map_err(|e| fs_err(&report_path, e))?;

    warn!(
        "quarantined {} → {} ({} at stage {})",
        input_path.display(),
        quarantine_path.display(),
        error.category(),
        stage
    );
    Ok(quarantine_path)
}

/// Rename when the filesystem allows it; otherwise copy via a synced
/// temp file in the destination directory, promote, delete the source.
/// A crash mid-move can duplicate the input but never lose or truncate it.
pub(crate) fn move_file(src: &Path, dest: &Path) -> Result<(), SeparatorError> {
    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    let dest_dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let bytes = std::fs::read(src).map_err(|e| fs_err(src, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dest_dir).map_err(|e| fs_err(dest_dir, e))?;
    tmp.write_all(&bytes).map_err(|e| fs_err(dest, e))?;
    tmp.as_file().sync_all().map_err(|e| fs_err(dest, e))?;
    tmp.persist(dest)
        .map_err(|e| fs_err(dest, e.error))?;
    std::fs::remove_file(src).map_err(|e| fs_err(src, e))?;
    Ok(())
}

fn fs_err(path: &Path, source: std::io::Error) -> SeparatorError {
    SeparatorError::FilesystemError {
        path: path.to_path_buf(),
        source,
    }
}

// ── Maintenance operations (CLI surface) ─────────────────────────────────

/// Summary of a quarantine directory, for `quarantine-status`.
#[derive(Debug, Default, Serialize)]
pub struct QuarantineStatus {
    pub quarantined_files: usize,
    pub reports: Vec<ErrorReport>,
    pub by_category: Vec<(String, usize)>,
}

/// Enumerate quarantined files and parse their reports.
pub fn status(quarantine_dir: &Path, report_dir: &Path) -> Result<QuarantineStatus, SeparatorError> {
    let mut result = QuarantineStatus::default();
    if !quarantine_dir.exists() {
        return Ok(result);
    }

    for entry in std::fs::read_dir(quarantine_dir).map_err(|e| fs_err(quarantine_dir, e))? {
        let entry = entry.map_err(|e| fs_err(quarantine_dir, e))?;
        let path = entry.path();
        if path.is_file() {
            result.quarantined_files += 1;
        }
    }

    if report_dir.exists() {
        for entry in std::fs::read_dir(report_dir).map_err(|e| fs_err(report_dir, e))? {
            let entry = entry.map_err(|e| fs_err(report_dir, e))?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| serde_json::from_str::<ErrorReport>(&s).ok())
                {
                    Some(report) => result.reports.push(report),
                    None => warn!("unparseable report {}", path.display()),
                }
            }
        }
    }

    let mut counts: Vec<(String, usize)> = Vec::new();
    for report in &result.reports {
        match counts.iter_mut().find(|(c, _)| *c == report.reason_category) {
            Some((_, n)) => *n += 1,
            None => counts.push((report.reason_category.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    result.by_category = counts;

    Ok(result)
}

/// Delete quarantined files (and their reports) older than
/// `older_than_days`. With `dry_run`, nothing is deleted; the returned
/// list names what would go.
pub fn clean(
    quarantine_dir: &Path,
    report_dir: &Path,
    older_than_days: u64,
    dry_run: bool,
) -> Result<Vec<PathBuf>, SeparatorError> {
    let cutoff = SystemTime::now() - Duration::from_secs(older_than_days * 86_400);
    let mut removed = Vec::new();

    for dir in [quarantine_dir, report_dir] {
        if !dir.exists() {
            continue;
        }
        for entry in std::fs::read_dir(dir).map_err(|e| fs_err(dir, e))? {
            let entry = entry.map_err(|e| fs_err(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let old_enough = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);
            if old_enough {
                if !dry_run {
                    std::fs::remove_file(&path).map_err(|e| fs_err(&path, e))?;
                }
                removed.push(path);
            }
        }
    }

    info!(
        "quarantine clean: {} file(s) {} (older than {} days)",
        removed.len(),
        if dry_run { "would be removed" } else { "removed" },
        older_than_days
    );
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config_with_quarantine(dir: &Path) -> Config {
        Config::builder()
            .quarantine_dir(dir.join("quarantine"))
            .build()
            .unwrap()
    }

    #[test]
    fn quarantine_moves_input_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("statements.pdf");
        std::fs::write(&input, b"%PDF-1.7 fake content").unwrap();

        let config = config_with_quarantine(dir.path());
        let error = SeparatorError::Encrypted {
            path: input.clone(),
        };

        let moved = quarantine_document(&input, "ingest", &error, &config).unwrap();

        assert!(!input.exists());
        assert!(moved.exists());
        let name = moved.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("failed_"));
        assert!(name.ends_with("_statements.pdf"));

        let reports: Vec<_> = std::fs::read_dir(config.report_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(reports.len(), 1);

        let report: ErrorReport =
            serde_json::from_str(&std::fs::read_to_string(&reports[0]).unwrap()).unwrap();
        assert_eq!(report.stage_at_failure, "ingest");
        assert_eq!(report.reason_category, "Encrypted");
        assert!(!report.recovery_hints.is_empty());
        assert_eq!(report.quarantine_path, moved);
    }

    #[test]
    fn status_counts_files_and_categories() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_quarantine(dir.path());

        for i in 0..2 {
            let input = dir.path().join(format!("doc{}.pdf", i));
            std::fs::write(&input, b"%PDF").unwrap();
            let error = SeparatorError::Encrypted { path: input.clone() };
            quarantine_document(&input, "ingest", &error, &config).unwrap();
        }

        let status = status(&config.quarantine_dir, &config.report_dir()).unwrap();
        assert_eq!(status.quarantined_files, 2);
        assert_eq!(status.reports.len(), 2);
        assert_eq!(status.by_category, vec![("Encrypted".to_string(), 2)]);
    }

    #[test]
    fn clean_dry_run_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_quarantine(dir.path());
        let input = dir.path().join("doc.pdf");
        std::fs::write(&input, b"%PDF").unwrap();
        let error = SeparatorError::Encrypted { path: input.clone() };
        let moved = quarantine_document(&input, "ingest", &error, &config).unwrap();

        // Everything is brand new; nothing is old enough to remove.
        let removed = clean(&config.quarantine_dir, &config.report_dir(), 7, true).unwrap();
        assert!(removed.is_empty());
        assert!(moved.exists());

        // Age zero days: everything qualifies, but dry_run keeps it.
        let removed = clean(&config.quarantine_dir, &config.report_dir(), 0, true).unwrap();
        assert!(!removed.is_empty());
        assert!(moved.exists());

        let removed = clean(&config.quarantine_dir, &config.report_dir(), 0, false).unwrap();
        assert!(!removed.is_empty());
        assert!(!moved.exists());
    }

    #[test]
    fn status_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let status = status(&missing, &missing.join("reports")).unwrap();
        assert_eq!(status.quarantined_files, 0);
        assert!(status.reports.is_empty());
    }
}
