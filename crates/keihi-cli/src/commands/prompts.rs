//! Prompt library commands

use anyhow::Result;
use keihi_core::prompts::{default_prompts_dir, PromptLibrary};

/// List all prompts and their override status
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!("Available Prompts:\n");
    println!(
        "{:<22} {:>7}  {:<16}  {}",
        "ID", "VERSION", "TASK TYPE", "OVERRIDE"
    );
    println!("{}", "-".repeat(60));

    for info in library.list() {
        let status = if info.has_override {
            "✓ Custom"
        } else {
            "Default"
        };
        println!(
            "{:<22} {:>7}  {:<16}  {}",
            info.id, info.version, info.task_type, status
        );
    }

    println!();
    println!(
        "Override directory: {}",
        default_prompts_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not available)".to_string())
    );
    println!("Copy a default prompt there as <id>.md to customize it.");

    Ok(())
}
