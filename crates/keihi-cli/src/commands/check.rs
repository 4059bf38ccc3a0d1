//! Backend and OCR availability check

use std::path::Path;

use anyhow::{bail, Result};
use keihi_core::{AIBackend, AIClient, OcrClient, OcrEngine, OcrEngineKind, PromptLibrary};

use super::core::load_config;

/// Check that the classification backend answers and OCR can run
pub async fn cmd_check(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    println!("🔍 Checking keihi setup...\n");
    println!("  Backend: {}", config.ai.backend.as_str());
    println!("  Host:    {}", config.ai.host);
    println!("  Model:   {}", config.ai.model);
    println!(
        "  API key: {}",
        if config.ai.api_key.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    println!("  OCR:     {}\n", config.ocr.engine.as_str());

    let mut problems = 0;

    print!("Classification backend... ");
    match AIClient::from_config(&config.ai) {
        Ok(ai) => {
            if ai.health_check().await {
                println!("✅ Connected ({})", ai.model());
            } else {
                println!("❌ Not reachable at {}", ai.host());
                problems += 1;
            }
        }
        Err(e) => {
            println!("❌ {}", e);
            problems += 1;
        }
    }

    print!("OCR engine... ");
    if config.ocr.engine == OcrEngineKind::None {
        println!("– Disabled (receipt mode unavailable)");
    } else {
        let mut prompts = PromptLibrary::new();
        match OcrClient::from_config(&config, &mut prompts) {
            Ok(ocr) => {
                if ocr.is_available().await {
                    println!("✅ {} ready", ocr.name());
                } else {
                    println!("❌ {} not available", ocr.name());
                    problems += 1;
                }
            }
            Err(e) => {
                println!("❌ {}", e);
                problems += 1;
            }
        }
    }

    println!();
    if problems > 0 {
        bail!("{} check(s) failed", problems);
    }
    println!("All checks passed.");
    Ok(())
}
