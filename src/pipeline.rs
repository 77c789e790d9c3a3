//! Batch orchestration: discover sidecars, drive each one through
//! match → detect → codec → commit, and aggregate outcomes.
//!
//! Units are independent — each touches a disjoint media file — so they
//! run in parallel on blocking worker threads bounded by a semaphore.
//! Results are merged into a [`RunSummary`] at join time; no shared
//! mutable counters. A cancellation token stops dispatching new units
//! while letting in-flight units finish their commit-or-rollback, so no
//! target is ever left half-written.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::codec;
use crate::config::RestoreConfig;
use crate::error::{RestoreError, Severity};
use crate::format::{self, ContainerFormat};
use crate::sidecar::{self, MetadataRecord};
use crate::write::{self, CommitOutcome};

/// Outcome of one sidecar unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Metadata committed to the media file.
    Written,
    /// Dry-run: the same work was performed and verified, minus the
    /// final rename.
    WouldWrite,
    /// The sidecar carried neither a timestamp nor a GPS fix.
    NothingToWrite,
    /// Unit skipped (warning class); the file is untouched.
    Skipped { reason: String },
    /// Unit failed (error class); the file is untouched.
    Failed { reason: String },
}

/// Per-sidecar report carried in the summary.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub sidecar: PathBuf,
    pub media: Option<PathBuf>,
    pub outcome: UnitOutcome,
}

/// Aggregated result of a batch run.
///
/// `written` counts dry-run would-writes too, so a dry run and a real run
/// over the same tree report the same intended actions.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sidecars_found: usize,
    pub matched: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub reports: Vec<UnitReport>,
}

impl RunSummary {
    fn absorb(&mut self, report: UnitReport) {
        if report.media.is_some() {
            self.matched += 1;
        }
        match &report.outcome {
            UnitOutcome::Written | UnitOutcome::WouldWrite => self.written += 1,
            UnitOutcome::NothingToWrite | UnitOutcome::Skipped { .. } => self.skipped += 1,
            UnitOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(report);
    }
}

/// A resolved pairing of one record to one media file, consumed once by
/// the write path and never persisted.
#[derive(Debug)]
pub struct MediaTarget {
    pub record: MetadataRecord,
    pub path: PathBuf,
    pub format: ContainerFormat,
}

/// Serializes units that resolve to the same media file — defense in
/// depth behind the matcher's `AmbiguousMatch`.
#[derive(Default)]
pub struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    fn for_path(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(path.to_path_buf()).or_default().clone()
    }
}

/// Recursively collect sidecar (`.json`) files under `root`.
pub fn collect_sidecars(root: &Path) -> Vec<PathBuf> {
    let mut sidecars = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("cannot access {}: {e}", e.path().map(|p| p.display().to_string()).unwrap_or_default());
                continue;
            }
        };
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            sidecars.push(path.to_path_buf());
        }
    }
    sidecars.sort();
    sidecars
}

/// Drive one sidecar through the full unit: parse, match, detect, embed,
/// commit. Every failure is converted into a structured outcome here; the
/// batch never aborts because one file failed.
pub fn process_sidecar(sidecar_path: &Path, dry_run: bool, locks: &PathLocks) -> UnitReport {
    let mut report = UnitReport {
        sidecar: sidecar_path.to_path_buf(),
        media: None,
        outcome: UnitOutcome::NothingToWrite,
    };

    let json = match std::fs::read_to_string(sidecar_path) {
        Ok(s) => s,
        Err(e) => {
            report.outcome = outcome_for(RestoreError::Io(e));
            return report;
        }
    };
    let record = match MetadataRecord::from_json(&json) {
        Ok(r) => r,
        Err(e) => {
            report.outcome = outcome_for(e);
            return report;
        }
    };

    let media_path = match sidecar::match_media_file(sidecar_path, &record.title) {
        Ok(p) => p,
        Err(e) => {
            report.outcome = outcome_for(e);
            return report;
        }
    };
    log::debug!("{} -> {}", sidecar_path.display(), media_path.display());
    report.media = Some(media_path.clone());

    let container = match format::detect_validated(&media_path) {
        Ok(ContainerFormat::Unsupported) => {
            report.outcome = UnitOutcome::Skipped {
                reason: format!("unsupported container: {}", media_path.display()),
            };
            return report;
        }
        Ok(f) => f,
        Err(e) => {
            report.outcome = outcome_for(e);
            return report;
        }
    };

    if record.taken_at.is_none() && record.gps.is_none() {
        report.outcome = UnitOutcome::NothingToWrite;
        return report;
    }

    let target = MediaTarget { record, path: media_path, format: container };
    report.outcome = write_target(&target, dry_run, locks);
    report
}

/// Read, mutate, and commit one resolved target under its per-path lock.
fn write_target(target: &MediaTarget, dry_run: bool, locks: &PathLocks) -> UnitOutcome {
    let lock = locks.for_path(&target.path);
    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

    let original = match std::fs::read(&target.path) {
        Ok(b) => b,
        Err(e) => return outcome_for(RestoreError::Io(e)),
    };
    let replacement = match codec::embed(target.format, &original, &target.record) {
        Ok(b) => b,
        Err(e) => return outcome_for(e),
    };

    match write::commit(&target.path, &replacement, dry_run) {
        Ok(CommitOutcome::Written) => UnitOutcome::Written,
        Ok(CommitOutcome::WouldWrite) => UnitOutcome::WouldWrite,
        Err(e) => outcome_for(e),
    }
}

fn outcome_for(err: RestoreError) -> UnitOutcome {
    match err.severity() {
        Severity::Warning => UnitOutcome::Skipped { reason: err.to_string() },
        Severity::Error => UnitOutcome::Failed { reason: err.to_string() },
    }
}

/// Run a whole batch. Fatal only when the root directory is unusable;
/// per-unit problems land in the summary instead.
pub async fn run_batch(
    config: &RestoreConfig,
    cancel: CancellationToken,
) -> anyhow::Result<RunSummary> {
    if !config.root.is_dir() {
        anyhow::bail!("root directory {} is not readable", config.root.display());
    }
    std::fs::read_dir(&config.root)
        .with_context(|| format!("cannot read root directory {}", config.root.display()))?;

    let sidecars = collect_sidecars(&config.root);
    let mut summary = RunSummary { sidecars_found: sidecars.len(), ..RunSummary::default() };
    log::info!("found {} sidecar file(s)", sidecars.len());
    if config.dry_run {
        log::info!("dry-run — no files will be modified");
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let locks = Arc::new(PathLocks::default());
    let dry_run = config.dry_run;

    let mut units = JoinSet::new();
    for path in sidecars {
        // Stop dispatching on cancellation; in-flight units run to
        // completion below.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("cancelled — no new units will start");
                break;
            }
            permit = semaphore.clone().acquire_owned() => {
                permit.context("semaphore closed")?
            }
        };
        let locks = locks.clone();
        units.spawn_blocking(move || {
            let _permit = permit;
            process_sidecar(&path, dry_run, &locks)
        });
    }

    while let Some(joined) = units.join_next().await {
        let report = joined.context("worker panicked")?;
        log_report(&report);
        summary.absorb(report);
    }

    log::info!(
        "summary: {} sidecars, {} matched, {} written, {} skipped, {} failed",
        summary.sidecars_found,
        summary.matched,
        summary.written,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

fn log_report(report: &UnitReport) {
    let name = report.sidecar.display();
    match &report.outcome {
        UnitOutcome::Written => log::info!("{name}: written"),
        UnitOutcome::WouldWrite => log::info!("{name}: would write"),
        UnitOutcome::NothingToWrite => log::debug!("{name}: nothing to write"),
        UnitOutcome::Skipped { reason } => log::warn!("{name}: skipped — {reason}"),
        UnitOutcome::Failed { reason } => log::error!("{name}: failed — {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Structurally valid JPEG used as a write target.
    fn jpeg_bytes() -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        out.extend_from_slice(b"JFIF\0");
        out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        out.extend_from_slice(&[0xAB, 0xCD, 0xEF]);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn sidecar_json(title: &str) -> String {
        format!(
            r#"{{"title":"{title}","photoTakenTime":{{"timestamp":"1577883600","formatted":"x"}},"geoDataExif":{{"latitude":48.8584,"longitude":2.2945,"altitude":35.0}}}}"#
        )
    }

    #[test]
    fn unit_writes_jpeg() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        let sidecar = dir.path().join("a.jpg.json");
        fs::write(&sidecar, sidecar_json("a.jpg")).unwrap();

        let report = process_sidecar(&sidecar, false, &PathLocks::default());
        assert_eq!(report.outcome, UnitOutcome::Written);
        assert!(report.media.is_some());

        let written = fs::read(dir.path().join("a.jpg")).unwrap();
        assert_ne!(written, jpeg_bytes());
        let tiff = crate::codec::jpeg::extract_tiff(&written).unwrap().unwrap();
        let doc = crate::codec::tiff::TiffDocument::parse(&tiff).unwrap();
        assert_eq!(doc.date_time_original().unwrap(), "2020:01:01 13:00:00");
    }

    #[test]
    fn unit_dry_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        let sidecar = dir.path().join("a.jpg.json");
        fs::write(&sidecar, sidecar_json("a.jpg")).unwrap();

        let report = process_sidecar(&sidecar, true, &PathLocks::default());
        assert_eq!(report.outcome, UnitOutcome::WouldWrite);
        assert_eq!(fs::read(dir.path().join("a.jpg")).unwrap(), jpeg_bytes());
    }

    #[test]
    fn unit_reports_no_match() {
        let dir = TempDir::new().unwrap();
        let sidecar = dir.path().join("a.jpg.json");
        fs::write(&sidecar, sidecar_json("a.jpg")).unwrap();

        let report = process_sidecar(&sidecar, false, &PathLocks::default());
        assert!(matches!(report.outcome, UnitOutcome::Skipped { .. }));
        assert!(report.media.is_none());
    }

    #[test]
    fn unit_reports_nothing_to_write() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        let sidecar = dir.path().join("a.jpg.json");
        fs::write(
            &sidecar,
            r#"{"title":"a.jpg","geoDataExif":{"latitude":0,"longitude":0,"altitude":0}}"#,
        )
        .unwrap();

        let report = process_sidecar(&sidecar, false, &PathLocks::default());
        assert_eq!(report.outcome, UnitOutcome::NothingToWrite);
        assert_eq!(fs::read(dir.path().join("a.jpg")).unwrap(), jpeg_bytes());
    }

    #[test]
    fn unit_mismatched_bytes_leave_file_alone() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), b"GIF89a not a jpeg").unwrap();
        let sidecar = dir.path().join("a.jpg.json");
        fs::write(&sidecar, sidecar_json("a.jpg")).unwrap();

        let report = process_sidecar(&sidecar, false, &PathLocks::default());
        assert!(matches!(report.outcome, UnitOutcome::Skipped { .. }));
        assert_eq!(fs::read(dir.path().join("a.jpg")).unwrap(), b"GIF89a not a jpeg");
    }

    #[test]
    fn collect_finds_nested_sidecars() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("album");
        fs::create_dir(&sub).unwrap();
        fs::write(dir.path().join("a.jpg.json"), "{}").unwrap();
        fs::write(sub.join("b.JSON"), "{}").unwrap();
        fs::write(sub.join("c.jpg"), "x").unwrap();

        let sidecars = collect_sidecars(dir.path());
        assert_eq!(sidecars.len(), 2);
    }

    #[tokio::test]
    async fn batch_aggregates_outcomes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        fs::write(dir.path().join("a.jpg.json"), sidecar_json("a.jpg")).unwrap();
        // Sidecar with no media file behind it.
        fs::write(dir.path().join("b.jpg.json"), sidecar_json("b.jpg")).unwrap();

        let config = RestoreConfig {
            root: dir.path().to_path_buf(),
            dry_run: false,
            concurrency: 2,
        };
        let summary = run_batch(&config, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.sidecars_found, 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn cancelled_batch_dispatches_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), jpeg_bytes()).unwrap();
        fs::write(dir.path().join("a.jpg.json"), sidecar_json("a.jpg")).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = RestoreConfig {
            root: dir.path().to_path_buf(),
            dry_run: false,
            concurrency: 1,
        };
        let summary = run_batch(&config, cancel).await.unwrap();

        assert_eq!(summary.sidecars_found, 1);
        assert!(summary.reports.is_empty());
        assert_eq!(fs::read(dir.path().join("a.jpg")).unwrap(), jpeg_bytes());
    }

    #[tokio::test]
    async fn fatal_on_unreadable_root() {
        let config = RestoreConfig {
            root: PathBuf::from("/nonexistent/takeout"),
            dry_run: false,
            concurrency: 1,
        };
        assert!(run_batch(&config, CancellationToken::new()).await.is_err());
    }
}
