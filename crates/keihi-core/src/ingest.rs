//! Batch ingestion of receipt images
//!
//! Each file in the pending area goes through
//! `discovered → preprocessed → text extracted → candidate built → classified → archived`.
//! A file only leaves the pending area once it has a valid record and that
//! record has been saved: [`ImageIngestor::process_directory`] only plans
//! the moves and [`ImageIngestor::archive_planned`] carries them out after
//! the ledger write. An interrupted or failed run can simply be repeated.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::config::{Config, ReceiptsConfig};
use crate::error::{Error, Result};
use crate::extract::extract_ocr;
use crate::models::ExpenseRecord;
use crate::ocr::{
    is_supported_extension, preprocess_file, OcrClient, OcrEngine, DEFAULT_BINARIZE_THRESHOLD,
};

/// Pending and processed receipt directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptDirs {
    pub pending: PathBuf,
    pub processed: PathBuf,
}

impl ReceiptDirs {
    pub fn new(pending: impl Into<PathBuf>, processed: impl Into<PathBuf>) -> Self {
        Self {
            pending: pending.into(),
            processed: processed.into(),
        }
    }

    pub fn from_config(config: &ReceiptsConfig) -> Self {
        Self::new(config.pending.clone(), config.processed.clone())
    }

    /// Create both directories if they do not exist yet
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.pending)?;
        fs::create_dir_all(&self.processed)?;
        Ok(())
    }
}

/// Cooperative cancellation flag, checked between files
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-file pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Discovered,
    Preprocessed,
    TextExtracted,
    CandidateBuilt,
    Classified,
    Archived,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Preprocessed => "preprocessed",
            Self::TextExtracted => "text_extracted",
            Self::CandidateBuilt => "candidate_built",
            Self::Classified => "classified",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file that did not make it through
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub path: PathBuf,
    /// Stage that could not be reached
    pub stage: IngestStage,
    pub reason: String,
}

/// A pending file and the processed path its record already points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Outcome of one batch
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    /// One record per classified file, valid or not, in file-name order
    pub records: Vec<ExpenseRecord>,
    pub failures: Vec<IngestFailure>,
    /// Moves for valid records, not yet carried out
    pub planned: Vec<PlannedMove>,
    /// Files moved to the processed area
    pub archived: usize,
    /// The stop signal ended the batch early
    pub stopped: bool,
    /// The classification service looked down and the batch was cut short
    pub outage: bool,
}

impl IngestReport {
    pub fn valid_records(&self) -> impl Iterator<Item = &ExpenseRecord> {
        self.records.iter().filter(|r| r.is_valid)
    }
}

pub struct ImageIngestor {
    dirs: ReceiptDirs,
    ocr: OcrClient,
    language: String,
    binarize_threshold: Option<u8>,
}

impl ImageIngestor {
    pub fn new(dirs: ReceiptDirs, ocr: OcrClient) -> Self {
        Self {
            dirs,
            ocr,
            language: "jpn+eng".to_string(),
            binarize_threshold: Some(DEFAULT_BINARIZE_THRESHOLD),
        }
    }

    pub fn from_config(config: &Config, dirs: ReceiptDirs, ocr: OcrClient) -> Self {
        Self::new(dirs, ocr)
            .with_language(&config.ocr.language)
            .with_binarize_threshold(config.ocr.binarize_threshold)
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_binarize_threshold(mut self, threshold: Option<u8>) -> Self {
        self.binarize_threshold = threshold;
        self
    }

    pub fn dirs(&self) -> &ReceiptDirs {
        &self.dirs
    }

    /// Image files waiting in the pending area, sorted by file name
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dirs.pending)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_supported_extension(path))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Process every pending image
    ///
    /// Only directory problems and an unavailable OCR engine are errors;
    /// per-file problems end up in [`IngestReport::failures`].
    pub async fn process_directory(
        &self,
        classifier: &mut Classifier,
        stop: &StopSignal,
    ) -> Result<IngestReport> {
        self.dirs.ensure()?;
        self.ocr.ensure_available().await?;

        let files = self.discover()?;
        let mut report = IngestReport::default();
        let mut taken = HashSet::new();

        if files.is_empty() {
            info!(pending = %self.dirs.pending.display(), "No receipt images found");
            return Ok(report);
        }
        info!(count = files.len(), engine = self.ocr.name(), "Processing receipts");

        for path in files {
            if stop.is_stopped() {
                info!("Stop requested, leaving remaining receipts pending");
                report.stopped = true;
                break;
            }
            if classifier.outage_detected() {
                warn!(
                    consecutive = classifier.consecutive_failures(),
                    "Classification service unavailable, stopping batch"
                );
                report.outage = true;
                break;
            }

            debug!(file = %path.display(), stage = ?IngestStage::Discovered, "Receipt found");
            match self.process_file(&path, classifier).await {
                Ok(record) if record.is_valid => {
                    match self.plan_target(&path, &taken) {
                        Ok(target) => {
                            debug!(from = %path.display(), to = %target.display(), "Archive planned");
                            taken.insert(target.clone());
                            report.records.push(ExpenseRecord {
                                source_image: Some(target.display().to_string()),
                                ..record
                            });
                            report.planned.push(PlannedMove {
                                from: path.clone(),
                                to: target,
                            });
                        }
                        Err(e) => {
                            warn!(file = %path.display(), error = %e, "Could not plan archive");
                            report.failures.push(IngestFailure {
                                path: path.clone(),
                                stage: IngestStage::Archived,
                                reason: e.to_string(),
                            });
                            report.records.push(record);
                        }
                    }
                }
                Ok(record) => {
                    warn!(
                        file = %path.display(),
                        notes = %record.notes,
                        "Receipt not classified, leaving it pending"
                    );
                    report.records.push(record);
                }
                Err(failure) => {
                    warn!(
                        file = %failure.path.display(),
                        stage = %failure.stage,
                        reason = %failure.reason,
                        "Receipt skipped"
                    );
                    report.failures.push(failure);
                }
            }
        }

        // the last call of the batch may be the one that crossed the threshold
        report.outage |= classifier.outage_detected();

        info!(
            records = report.records.len(),
            planned = report.planned.len(),
            failed = report.failures.len(),
            "Receipt batch finished"
        );
        Ok(report)
    }

    /// Move every planned file into the processed area
    ///
    /// Call this once the records are safely stored. A move that fails is
    /// recorded as an [`IngestStage::Archived`] failure and its file stays
    /// pending.
    pub fn archive_planned(&self, report: &mut IngestReport) {
        for planned in std::mem::take(&mut report.planned) {
            match move_file(&planned.from, &planned.to) {
                Ok(()) => {
                    info!(from = %planned.from.display(), to = %planned.to.display(), "Receipt archived");
                    report.archived += 1;
                }
                Err(e) => {
                    warn!(file = %planned.from.display(), error = %e, "Could not archive receipt");
                    report.failures.push(IngestFailure {
                        path: planned.from,
                        stage: IngestStage::Archived,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn plan_target(&self, src: &Path, taken: &HashSet<PathBuf>) -> Result<PathBuf> {
        let file_name = src
            .file_name()
            .ok_or_else(|| Error::InvalidData(format!("no file name: {}", src.display())))?;
        Ok(unique_target(&self.dirs.processed, Path::new(file_name), taken))
    }

    async fn process_file(
        &self,
        path: &Path,
        classifier: &mut Classifier,
    ) -> std::result::Result<ExpenseRecord, IngestFailure> {
        let fail = |stage: IngestStage, reason: String| IngestFailure {
            path: path.to_path_buf(),
            stage,
            reason,
        };

        let png = preprocess_file(path, self.binarize_threshold)
            .map_err(|e| fail(IngestStage::Preprocessed, e.to_string()))?;

        let text = self
            .ocr
            .extract_text(&png, &self.language)
            .await
            .map_err(|e| fail(IngestStage::TextExtracted, e.to_string()))?;
        if text.trim().is_empty() {
            return Err(fail(IngestStage::TextExtracted, "no text recognized".into()));
        }

        let candidate = extract_ocr(&text, Some(&path.display().to_string()));
        debug!(
            file = %path.display(),
            stage = ?IngestStage::CandidateBuilt,
            amount = ?candidate.raw_amount,
            date = ?candidate.raw_date,
            "Candidate built"
        );

        Ok(classifier.classify(&candidate).await)
    }
}

/// Move `src` into `dir`, adding `_1`, `_2`, … on name collisions
pub fn archive(src: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .ok_or_else(|| Error::InvalidData(format!("no file name: {}", src.display())))?;
    let target = unique_target(dir, Path::new(file_name), &HashSet::new());
    move_file(src, &target)?;
    Ok(target)
}

fn move_file(src: &Path, target: &Path) -> Result<()> {
    if exists(target) {
        return Err(Error::InvalidData(format!(
            "{} already exists",
            target.display()
        )));
    }
    if let Err(rename_err) = fs::rename(src, target) {
        // rename cannot cross filesystems
        debug!(error = %rename_err, "rename failed, copying instead");
        fs::copy(src, target).map_err(|_| rename_err)?;
        if let Err(e) = fs::remove_file(src) {
            if let Err(cleanup) = fs::remove_file(target) {
                warn!(
                    file = %target.display(),
                    error = %cleanup,
                    "Could not remove copy after failed move; receipt now exists twice"
                );
            }
            return Err(e.into());
        }
    }
    Ok(())
}

/// First free name in `dir`, skipping names already claimed in this batch
fn unique_target(dir: &Path, file_name: &Path, taken: &HashSet<PathBuf>) -> PathBuf {
    let free = |p: &PathBuf| !exists(p) && !taken.contains(p);
    let candidate = dir.join(file_name);
    if free(&candidate) {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dir.join(format!("{}_{}{}", stem, n, ext)))
        .find(free)
        .unwrap_or(candidate)
}

fn exists(path: &Path) -> bool {
    !matches!(fs::symlink_metadata(path), Err(e) if e.kind() == io::ErrorKind::NotFound)
}
