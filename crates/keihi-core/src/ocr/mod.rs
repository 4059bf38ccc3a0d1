//! Receipt text recognition
//!
//! Recognition itself is delegated: either to a local `tesseract` binary or
//! to a vision-capable model. This module owns what happens before that call
//! (decoding and preprocessing) and the engine selection.

mod preprocess;
mod tesseract;

pub use preprocess::{
    is_supported_extension, preprocess, preprocess_file, DEFAULT_BINARIZE_THRESHOLD,
    SUPPORTED_EXTENSIONS,
};
pub use tesseract::TesseractOcr;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::ai::{AIBackend, AIClient};
use crate::config::{Config, OcrEngineKind};
use crate::error::{Error, Result};
use crate::prompts::{Prompt, PromptId, PromptLibrary};

/// Text extraction from a preprocessed PNG
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize the text in `image_png`
    async fn extract_text(&self, image_png: &[u8], language: &str) -> Result<String>;

    /// Whether the engine can be used at all
    async fn is_available(&self) -> bool;

    /// Engine name (for logging)
    fn name(&self) -> &str;
}

/// OCR through a vision model and the `transcribe_receipt` prompt
#[derive(Clone)]
pub struct VisionOcr {
    ai: AIClient,
    prompt: Prompt,
}

impl VisionOcr {
    pub fn new(ai: AIClient, prompts: &mut PromptLibrary) -> Result<Self> {
        let prompt = prompts.get(PromptId::TranscribeReceipt)?.clone();
        Ok(Self { ai, prompt })
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn extract_text(&self, image_png: &[u8], language: &str) -> Result<String> {
        let vars: HashMap<&str, &str> = [("language", language)].into_iter().collect();
        let prompt = self.prompt.render(&vars);
        self.ai
            .transcribe_image(&prompt, image_png)
            .await
            .map_err(|e| Error::Ocr(format!("vision transcription failed: {}", e)))
    }

    async fn is_available(&self) -> bool {
        self.ai.health_check().await
    }

    fn name(&self) -> &str {
        "vision"
    }
}

/// Scripted OCR for tests
///
/// Returns the queued texts in order; once one is left it is repeated.
#[derive(Clone)]
pub struct MockOcr {
    texts: Arc<Mutex<VecDeque<String>>>,
    available: bool,
}

impl MockOcr {
    pub fn new(text: &str) -> Self {
        Self::with_texts([text])
    }

    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: Arc::new(Mutex::new(texts.into_iter().map(Into::into).collect())),
            available: true,
        }
    }

    /// An engine that reports itself unavailable
    pub fn unavailable() -> Self {
        Self {
            texts: Arc::new(Mutex::new(VecDeque::new())),
            available: false,
        }
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn extract_text(&self, _image_png: &[u8], _language: &str) -> Result<String> {
        if !self.available {
            return Err(Error::OcrUnavailable("mock OCR is unavailable".into()));
        }
        let mut texts = self
            .texts
            .lock()
            .map_err(|_| Error::Ocr("mock OCR state poisoned".into()))?;
        let text = if texts.len() > 1 {
            texts.pop_front()
        } else {
            texts.front().cloned()
        };
        text.ok_or_else(|| Error::Ocr("no text recognized".into()))
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Concrete OCR engine enum
#[derive(Clone)]
pub enum OcrClient {
    Tesseract(TesseractOcr),
    Vision(VisionOcr),
    Mock(MockOcr),
}

impl OcrClient {
    /// Build the engine named in the `[ocr]` section
    pub fn from_config(config: &Config, prompts: &mut PromptLibrary) -> Result<Self> {
        match config.ocr.engine {
            OcrEngineKind::Tesseract => Ok(OcrClient::Tesseract(TesseractOcr::new(
                &config.ocr.tesseract_cmd,
            ))),
            OcrEngineKind::Vision => {
                let ai = AIClient::from_config(&config.ai)?.with_model(&config.ai.vision_model);
                Ok(OcrClient::Vision(VisionOcr::new(ai, prompts)?))
            }
            OcrEngineKind::None => Err(Error::OcrUnavailable(
                "OCR is disabled ([ocr] engine = \"none\")".into(),
            )),
        }
    }

    /// Fail with `OcrUnavailable` unless the engine can be used
    pub async fn ensure_available(&self) -> Result<()> {
        if self.is_available().await {
            debug!(engine = self.name(), "OCR engine available");
            Ok(())
        } else {
            Err(Error::OcrUnavailable(format!(
                "{} OCR engine is not available",
                self.name()
            )))
        }
    }
}

#[async_trait]
impl OcrEngine for OcrClient {
    async fn extract_text(&self, image_png: &[u8], language: &str) -> Result<String> {
        match self {
            OcrClient::Tesseract(e) => e.extract_text(image_png, language).await,
            OcrClient::Vision(e) => e.extract_text(image_png, language).await,
            OcrClient::Mock(e) => e.extract_text(image_png, language).await,
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            OcrClient::Tesseract(e) => e.is_available().await,
            OcrClient::Vision(e) => e.is_available().await,
            OcrClient::Mock(e) => e.is_available().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            OcrClient::Tesseract(e) => e.name(),
            OcrClient::Vision(e) => e.name(),
            OcrClient::Mock(e) => e.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    #[tokio::test]
    async fn test_mock_ocr_sequence() {
        let ocr = MockOcr::with_texts(["first", "second"]);
        assert_eq!(ocr.extract_text(&[], "jpn").await.unwrap(), "first");
        assert_eq!(ocr.extract_text(&[], "jpn").await.unwrap(), "second");
        assert_eq!(ocr.extract_text(&[], "jpn").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_ensure_available() {
        assert!(OcrClient::Mock(MockOcr::new("x")).ensure_available().await.is_ok());
        assert!(matches!(
            OcrClient::Mock(MockOcr::unavailable()).ensure_available().await,
            Err(Error::OcrUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_vision_ocr_uses_transcription() {
        let ai = AIClient::Mock(MockBackend::new().with_transcription("ローソン\n合計 ¥640"));
        let ocr = VisionOcr::new(ai, &mut PromptLibrary::embedded_only()).unwrap();
        assert_eq!(
            ocr.extract_text(&[0u8; 4], "jpn+eng").await.unwrap(),
            "ローソン\n合計 ¥640"
        );
    }

    #[tokio::test]
    async fn test_vision_ocr_failure_is_ocr_error() {
        let ai = AIClient::Mock(MockBackend::failing("down"));
        let ocr = VisionOcr::new(ai, &mut PromptLibrary::embedded_only()).unwrap();
        assert!(matches!(
            ocr.extract_text(&[], "jpn").await,
            Err(Error::Ocr(_))
        ));
        assert!(!ocr.is_available().await);
    }

    #[test]
    fn test_from_config() {
        let mut prompts = PromptLibrary::embedded_only();
        let mut config = Config::default();
        assert!(matches!(
            OcrClient::from_config(&config, &mut prompts),
            Ok(OcrClient::Tesseract(_))
        ));

        config.ocr.engine = OcrEngineKind::None;
        assert!(matches!(
            OcrClient::from_config(&config, &mut prompts),
            Err(Error::OcrUnavailable(_))
        ));

        config.ocr.engine = OcrEngineKind::Vision;
        config.ai.backend = crate::config::AiBackendKind::Mock;
        assert!(matches!(
            OcrClient::from_config(&config, &mut prompts),
            Ok(OcrClient::Vision(_))
        ));
    }
}
