//! Error types for Keihi

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Unsupported image encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Classification service outage: {consecutive} consecutive failures")]
    ServiceOutage { consecutive: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
