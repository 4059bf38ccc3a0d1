//! Mock backend for testing
//!
//! Provides configurable mock responses for completions and transcriptions.
//! Useful for unit tests and development without a running model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::parse_amount_digits;

use super::AIBackend;

#[derive(Clone, Debug)]
enum Mode {
    /// Classify by keyword from the prompt's field lines
    Keywords,
    /// Return the same text for every completion
    Fixed(String),
    /// Fail every call with this message
    Failing(String),
}

/// Mock AI backend for testing
///
/// By default it reads the `項目:` / `金額:` / `日付:` lines the
/// classification prompt renders and answers with a keyword-based category.
#[derive(Clone)]
pub struct MockBackend {
    mode: Mode,
    transcription: String,
    /// Whether health_check should return true
    pub healthy: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy, keyword classifier)
    pub fn new() -> Self {
        Self {
            mode: Mode::Keywords,
            transcription: String::new(),
            healthy: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every completion returns `reply` verbatim
    pub fn with_response(reply: &str) -> Self {
        Self {
            mode: Mode::Fixed(reply.to_string()),
            ..Self::new()
        }
    }

    /// Every call fails as an unreachable service would
    pub fn failing(message: &str) -> Self {
        Self {
            mode: Mode::Failing(message.to_string()),
            healthy: false,
            ..Self::new()
        }
    }

    /// Text returned by `transcribe_image`
    pub fn with_transcription(mut self, text: &str) -> Self {
        self.transcription = text.to_string();
        self
    }

    /// Number of calls made so far (shared between clones)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The reply the keyword classifier gives for `prompt`
    pub fn keyword_reply(prompt: &str) -> String {
        let description = field(prompt, "項目:").unwrap_or_default();
        let detail = field(prompt, "詳細:").unwrap_or_default();
        let raw_text = prompt
            .split_once("元のテキスト:")
            .map(|(_, t)| t)
            .unwrap_or_default();
        let haystack = format!("{} {} {}", description, detail, raw_text);

        let (category, sub_category) = keyword_category(&haystack);
        let amount = field(prompt, "金額:")
            .and_then(parse_amount_digits)
            .or_else(|| field(raw_text, "合計").and_then(parse_amount_digits));

        let purpose = if ["会社", "取引先", "出張", "会議", "打ち合わせ"]
            .iter()
            .any(|k| haystack.contains(k))
        {
            "business"
        } else {
            "unknown"
        };

        let mut reply = json!({
            "category": category,
            "sub_category": sub_category,
            "amount": amount.unwrap_or(0),
            "description": description,
            "purpose": purpose,
            "is_valid": amount.is_some(),
            "notes": if amount.is_some() { "" } else { "金額不明" },
        });
        if let Some(date) = field(prompt, "日付:") {
            reply["date"] = json!(date);
        }
        reply.to_string()
    }
}

/// Value following `prefix` on the first line that starts with it
fn field<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn keyword_category(text: &str) -> (&'static str, Option<&'static str>) {
    const RULES: &[(&str, &[&str])] = &[
        ("交通費", &["タクシー", "電車", "新幹線", "バス", "駐車", "ガソリン"]),
        ("宿泊費", &["ホテル", "旅館", "宿泊"]),
        ("会議費", &["会議", "打ち合わせ", "セミナー"]),
        ("飲食費", &["ランチ", "昼食", "夕食", "カフェ", "コーヒー", "弁当", "レストラン"]),
        ("消耗品費", &["文房具", "ペン", "用紙", "トナー", "事務用品"]),
    ];

    for (category, keywords) in RULES {
        if let Some(k) = keywords.iter().find(|k| text.contains(*k)) {
            return (*category, Some(*k));
        }
    }
    ("その他", None)
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            Mode::Keywords => Ok(Self::keyword_reply(prompt)),
            Mode::Fixed(reply) => Ok(reply.clone()),
            Mode::Failing(message) => Err(Error::InvalidData(message.clone())),
        }
    }

    async fn transcribe_image(&self, _prompt: &str, _image_png: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            Mode::Failing(message) => Err(Error::InvalidData(message.clone())),
            _ => Ok(self.transcription.clone()),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
