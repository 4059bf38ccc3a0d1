//! Prompt templates for the classification and transcription calls
//!
//! A prompt file is Markdown with YAML frontmatter (`id`, `version`,
//! `task_type`). Defaults are compiled in; a file named `<id>.md` in the
//! override directory (`~/.local/share/keihi/prompts/overrides/`) replaces
//! the default, so the category hints can be tuned without rebuilding.
//!
//! Templates support `{{name}}` placeholders and `{{#if name}}…{{/if}}`
//! blocks that are kept only when `name` has a non-empty value.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

const CLASSIFY_EXPENSE: &str = include_str!("../../../prompts/classify_expense.md");
const TRANSCRIBE_RECEIPT: &str = include_str!("../../../prompts/transcribe_receipt.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Classify one expense candidate into the category taxonomy
    ClassifyExpense,
    /// Transcribe a receipt image to plain text (vision OCR)
    TranscribeReceipt,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifyExpense => "classify_expense",
            Self::TranscribeReceipt => "transcribe_receipt",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[Self::ClassifyExpense, Self::TranscribeReceipt]
    }

    fn embedded(&self) -> &'static str {
        match self {
            Self::ClassifyExpense => CLASSIFY_EXPENSE,
            Self::TranscribeReceipt => TRANSCRIBE_RECEIPT,
        }
    }

    fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }
}

/// Prompt frontmatter
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    pub version: u32,
    /// classification, vision
    pub task_type: String,
}

/// Where a prompt was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Embedded,
    Override(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// Template text below the frontmatter
    pub template: String,
    pub source: PromptSource,
}

impl Prompt {
    /// Parse a prompt file
    pub fn parse(text: &str, source: PromptSource) -> Result<Self> {
        let (frontmatter, template) = split_frontmatter(text)?;
        let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
            .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;
        Ok(Self {
            metadata,
            template: template.to_string(),
            source,
        })
    }

    pub fn is_override(&self) -> bool {
        matches!(self.source, PromptSource::Override(_))
    }

    /// Fill the template; placeholders without a value render empty
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.template, vars)
    }
}

/// Loads prompts on first use and keeps them for the library's lifetime
pub struct PromptLibrary {
    overrides: Option<PathBuf>,
    loaded: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library reading overrides from the default data directory
    pub fn new() -> Self {
        Self::from_parts(default_prompts_dir())
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self::from_parts(Some(path))
    }

    /// Library that ignores override files
    pub fn embedded_only() -> Self {
        Self::from_parts(None)
    }

    fn from_parts(overrides: Option<PathBuf>) -> Self {
        Self {
            overrides,
            loaded: HashMap::new(),
        }
    }

    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        match self.loaded.entry(id) {
            Entry::Occupied(e) => Ok(&*e.into_mut()),
            Entry::Vacant(e) => {
                let prompt = load(id, self.overrides.as_deref())?;
                Ok(&*e.insert(prompt))
            }
        }
    }

    /// Every known prompt with its version and override status
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let override_path = self.override_path(id);
                let (version, task_type) = match self.get(id) {
                    Ok(p) => (p.metadata.version, p.metadata.task_type.clone()),
                    Err(_) => (0, String::new()),
                };
                PromptInfo {
                    id: id.as_str().to_string(),
                    version,
                    task_type,
                    has_override: override_path.is_some(),
                    override_path,
                }
            })
            .collect()
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some()
    }

    /// Existing override file for `id`
    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.overrides
            .as_ref()
            .map(|dir| dir.join(id.file_name()))
            .filter(|p| p.is_file())
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.overrides.as_deref()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for `keihi prompts list`
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: String,
    pub version: u32,
    pub task_type: String,
    pub has_override: bool,
    pub override_path: Option<PathBuf>,
}

pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("keihi").join("prompts").join("overrides"))
}

fn load(id: PromptId, overrides: Option<&Path>) -> Result<Prompt> {
    if let Some(path) = overrides.map(|d| d.join(id.file_name())) {
        if path.is_file() {
            debug!(prompt = id.as_str(), path = %path.display(), "Using prompt override");
            let text = fs::read_to_string(&path).map_err(|e| {
                Error::InvalidData(format!("Failed to read prompt {}: {}", path.display(), e))
            })?;
            return Prompt::parse(&text, PromptSource::Override(path));
        }
    }
    Prompt::parse(id.embedded(), PromptSource::Embedded)
}

/// Split `---\n<yaml>\n---\n<body>` into its two parts
fn split_frontmatter(text: &str) -> Result<(&str, &str)> {
    let rest = text
        .trim_start()
        .strip_prefix("---")
        .ok_or_else(|| Error::InvalidData("Prompt must start with YAML frontmatter".into()))?;
    let end = rest
        .find("\n---")
        .ok_or_else(|| Error::InvalidData("Prompt frontmatter is not closed".into()))?;
    Ok((rest[..end].trim(), rest[end + 4..].trim()))
}

fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    const END_IF: &str = "{{/if}}";

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let tag = after[..close].trim();
        rest = &after[close + 2..];

        if let Some(name) = tag.strip_prefix("#if ") {
            let (body, tail) = match rest.find(END_IF) {
                Some(end) => (&rest[..end], &rest[end + END_IF.len()..]),
                None => (rest, ""),
            };
            if vars.get(name.trim()).is_some_and(|v| !v.is_empty()) {
                out.push_str(&render_template(body, vars));
            }
            rest = tail;
        } else if let Some(value) = vars.get(tag) {
            out.push_str(value);
        }
    }

    out.push_str(rest);
    out
}
