//! Keihi Core Library
//!
//! Shared functionality for the Keihi expense ledger tool:
//! - Field extraction from typed entries and OCR text
//! - Repair of loosely structured classification replies
//! - Pluggable completion backends (OpenAI-compatible, Ollama)
//! - Expense classification with outage detection
//! - Receipt image preprocessing, OCR and archiving
//! - CSV ledger with renumbering and total recomputation
//! - Prompt library for customizable prompts

pub mod ai;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod ocr;
pub mod prompts;

/// Test utilities including mock completion server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    repair, repair_record, AIBackend, AIClient, ClassificationReply, MockBackend, OllamaBackend,
    OpenAICompatibleBackend, ParseOutcome, ReplyDefaults,
};
pub use classify::Classifier;
pub use config::{AiBackendKind, Config, OcrEngineKind};
pub use error::{Error, Result};
pub use extract::{extract_interactive, extract_ocr};
pub use ingest::{
    ImageIngestor, IngestFailure, IngestReport, IngestStage, PlannedMove, ReceiptDirs,
    StopSignal,
};
pub use ledger::{
    load, reconcile, summarize, LedgerEntry, LedgerFormat, LedgerRow, LedgerStore, LedgerSummary,
    LedgerTable, SheetRow,
};
pub use models::{Category, ExpenseCandidate, ExpenseRecord, Purpose, SourceHint};
pub use ocr::{MockOcr, OcrClient, OcrEngine, TesseractOcr, VisionOcr};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
