//! Keihi configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/keihi/config.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Environment variables are applied on top of whichever file was used.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ledger::LedgerFormat;
use crate::ocr::DEFAULT_BINARIZE_THRESHOLD;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/keihi.toml");

/// Which classification backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiBackendKind {
    OpenAICompatible,
    Ollama,
    Mock,
}

impl AiBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAICompatible => "openai_compatible",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}

impl std::str::FromStr for AiBackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                Ok(Self::OpenAICompatible)
            }
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown AI backend: {}", s)),
        }
    }
}

/// Which OCR engine reads receipt images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEngineKind {
    /// Local `tesseract` binary
    Tesseract,
    /// Vision-capable model on the configured AI backend
    Vision,
    /// No OCR; batch image mode is unavailable
    None,
}

impl OcrEngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::Vision => "vision",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for OcrEngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "vision" => Ok(Self::Vision),
            "none" | "off" => Ok(Self::None),
            _ => Err(format!("Unknown OCR engine: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub backend: AiBackendKind,
    pub host: String,
    pub model: String,
    pub vision_model: String,
    pub api_key: Option<String>,
    /// `None` means no client-side timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub engine: OcrEngineKind,
    /// Language hint passed to the engine (tesseract `-l` syntax)
    pub language: String,
    pub tesseract_cmd: String,
    /// `None` keeps grayscale (set `binarize_threshold = 0` in the file)
    pub binarize_threshold: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct ReceiptsConfig {
    pub pending: PathBuf,
    pub processed: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    /// Format of files created at the default location
    pub format: LedgerFormat,
}

#[derive(Debug, Clone)]
pub struct ClassificationConfig {
    /// Consecutive service failures that count as an outage (0 = never)
    pub max_consecutive_failures: u32,
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub ai: AiConfig,
    pub ocr: OcrConfig,
    pub receipts: ReceiptsConfig,
    pub ledger: LedgerConfig,
    pub classification: ClassificationConfig,
    /// File the config was read from (`None` for embedded defaults)
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai: AiConfig {
                backend: AiBackendKind::OpenAICompatible,
                host: "https://api.openai.com".to_string(),
                model: "gpt-4o-mini".to_string(),
                vision_model: "gpt-4o-mini".to_string(),
                api_key: None,
                timeout: None,
            },
            ocr: OcrConfig {
                engine: OcrEngineKind::Tesseract,
                language: "jpn+eng".to_string(),
                tesseract_cmd: "tesseract".to_string(),
                binarize_threshold: Some(DEFAULT_BINARIZE_THRESHOLD),
            },
            receipts: ReceiptsConfig {
                pending: PathBuf::from("receipts/pending"),
                processed: PathBuf::from("receipts/processed"),
            },
            ledger: LedgerConfig {
                output_dir: PathBuf::from("."),
                file_prefix: "expense_report".to_string(),
                format: LedgerFormat::Xlsx,
            },
            classification: ClassificationConfig {
                max_consecutive_failures: 3,
            },
            source: None,
        }
    }
}

impl Config {
    /// Load from `path`, the data-dir override, or embedded defaults, then apply env
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults (no env applied)
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("AI_BACKEND") {
            match backend.parse() {
                Ok(kind) => self.ai.backend = kind,
                Err(e) => warn!(backend = %backend, "{}, keeping configured backend", e),
            }
        }

        match self.ai.backend {
            AiBackendKind::OpenAICompatible => {
                if let Some(host) = lookup("OPENAI_COMPATIBLE_HOST") {
                    self.ai.host = host;
                }
                if let Some(model) = lookup("OPENAI_COMPATIBLE_MODEL") {
                    self.ai.model = model;
                }
                if let Some(key) =
                    lookup("OPENAI_COMPATIBLE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"))
                {
                    self.ai.api_key = Some(key);
                }
            }
            AiBackendKind::Ollama => {
                if let Some(host) = lookup("OLLAMA_HOST") {
                    self.ai.host = host;
                }
                if let Some(model) = lookup("OLLAMA_MODEL") {
                    self.ai.model = model;
                }
            }
            AiBackendKind::Mock => {}
        }

        if let Some(engine) = lookup("KEIHI_OCR_ENGINE") {
            match engine.parse() {
                Ok(kind) => self.ocr.engine = kind,
                Err(e) => warn!(engine = %engine, "{}, keeping configured engine", e),
            }
        }
        if let Some(dir) = lookup("KEIHI_PENDING_DIR") {
            self.receipts.pending = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KEIHI_PROCESSED_DIR") {
            self.receipts.processed = PathBuf::from(dir);
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("keihi").join("config.toml"))
}

fn load_file(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let mut config = parse_config(&content)?;
        config.source = Some(path.to_path_buf());
        return Ok(config);
    }

    if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            debug!(path = %default_path.display(), "Loading config override");
            let content = fs::read_to_string(&default_path)
                .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
            let mut config = parse_config(&content)?;
            config.source = Some(default_path);
            return Ok(config);
        }
    }

    parse_config(DEFAULT_CONFIG)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    ai: Option<RawAi>,
    ocr: Option<RawOcr>,
    receipts: Option<RawReceipts>,
    ledger: Option<RawLedger>,
    classification: Option<RawClassification>,
}

#[derive(Debug, Deserialize)]
struct RawAi {
    backend: Option<String>,
    host: Option<String>,
    model: Option<String>,
    vision_model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawOcr {
    engine: Option<String>,
    language: Option<String>,
    tesseract_cmd: Option<String>,
    binarize_threshold: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawReceipts {
    pending: Option<PathBuf>,
    processed: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawLedger {
    output_dir: Option<PathBuf>,
    file_prefix: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    max_consecutive_failures: Option<u32>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::default();

    if let Some(ai) = raw.ai {
        if let Some(backend) = ai.backend {
            config.ai.backend = backend.parse().map_err(Error::Config)?;
        }
        if let Some(host) = ai.host {
            config.ai.host = host;
        }
        if let Some(model) = ai.model {
            config.ai.model = model;
        }
        if let Some(vision_model) = ai.vision_model {
            config.ai.vision_model = vision_model;
        }
        config.ai.api_key = ai.api_key.filter(|k| !k.is_empty());
        config.ai.timeout = ai.timeout_secs.map(Duration::from_secs);
    }

    if let Some(ocr) = raw.ocr {
        if let Some(engine) = ocr.engine {
            config.ocr.engine = engine.parse().map_err(Error::Config)?;
        }
        if let Some(language) = ocr.language {
            config.ocr.language = language;
        }
        if let Some(cmd) = ocr.tesseract_cmd {
            config.ocr.tesseract_cmd = cmd;
        }
        if let Some(threshold) = ocr.binarize_threshold {
            config.ocr.binarize_threshold = Some(threshold).filter(|t| *t > 0);
        }
    }

    if let Some(receipts) = raw.receipts {
        if let Some(pending) = receipts.pending {
            config.receipts.pending = pending;
        }
        if let Some(processed) = receipts.processed {
            config.receipts.processed = processed;
        }
    }

    if let Some(ledger) = raw.ledger {
        if let Some(dir) = ledger.output_dir {
            config.ledger.output_dir = dir;
        }
        if let Some(prefix) = ledger.file_prefix {
            config.ledger.file_prefix = prefix;
        }
        if let Some(format) = ledger.format {
            config.ledger.format = format.parse().map_err(Error::Config)?;
        }
    }

    if let Some(classification) = raw.classification {
        if let Some(max) = classification.max_consecutive_failures {
            config.classification.max_consecutive_failures = max;
        }
    }

    Ok(config)
}
