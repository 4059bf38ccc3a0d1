//! Local tesseract binary
//!
//! Runs `tesseract stdin stdout -l <lang>` with the PNG on stdin.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

use super::OcrEngine;

#[derive(Clone, Debug)]
pub struct TesseractOcr {
    command: String,
}

impl TesseractOcr {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract_text(&self, image_png: &[u8], language: &str) -> Result<String> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::OcrUnavailable(format!("cannot run {}: {}", self.command, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image_png).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ocr(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.chars().count(), "tesseract finished");
        Ok(text)
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.command)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
