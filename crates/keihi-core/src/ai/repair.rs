//! Repair of classification replies
//!
//! Models are asked for a bare JSON object but routinely wrap it in code
//! fences, surround it with prose, leave a trailing comma before `}` or drop
//! the comma between two `"key": value` lines. Repair is an ordered chain of
//! pure text transformations, each applied only when the previous parse
//! attempt failed:
//!
//! 1. strip fences, surrounding whitespace and prose outside the outermost braces
//! 2. parse directly (→ [`ParseOutcome::Direct`])
//! 3. remove trailing commas before `}` / `]`
//! 4. insert commas between adjacent key/value lines
//! 5. parse again (→ [`ParseOutcome::Repaired`] or [`ParseOutcome::Unrecoverable`])
//!
//! Nothing here returns an error: [`repair_record`] degrades to the sentinel
//! record.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::extract;
use crate::models::{parse_amount_digits, Category, ExpenseRecord, Purpose, MAX_AMOUNT};

/// A classification reply as the model wrote it
///
/// Every field is optional so that partially filled replies still parse;
/// gaps are filled from [`ReplyDefaults`] when converting to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClassificationReply {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<u64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Accepts `1500`, `1500.0`, `"¥1,500"` or `null`
///
/// Negative, non-finite and implausibly large values read as missing.
fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => Some(v),
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && *f <= MAX_AMOUNT as f64)
                .map(|f| f.round() as u64),
        }
        .filter(|v| *v <= MAX_AMOUNT),
        Value::String(s) => parse_amount_digits(&s),
        _ => None,
    })
}

/// Note added when neither the reply nor the candidate has an amount
pub const AMOUNT_UNKNOWN_NOTE: &str = "金額不明";

/// Values used where the reply left a field out
#[derive(Debug, Clone)]
pub struct ReplyDefaults {
    pub date: NaiveDate,
    pub amount: Option<u64>,
    pub description: Option<String>,
}

impl ReplyDefaults {
    /// Defaults with nothing but a date
    pub fn dated(date: NaiveDate) -> Self {
        Self {
            date,
            amount: None,
            description: None,
        }
    }
}

impl ClassificationReply {
    /// Convert into a record, filling gaps from `defaults`
    ///
    /// The returned record always satisfies the validity invariant.
    pub fn into_record(self, defaults: &ReplyDefaults) -> ExpenseRecord {
        let mut notes: Vec<String> = self
            .notes
            .filter(|n| !n.trim().is_empty())
            .into_iter()
            .collect();

        let category = match self.category.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => match label.parse::<Category>() {
                Ok(cat) => cat,
                Err(_) => {
                    notes.push(format!("未知のカテゴリ: {}", label));
                    Category::Other
                }
            },
            _ => {
                notes.push("カテゴリ未指定".to_string());
                Category::Other
            }
        };

        let date = self
            .date
            .as_deref()
            .and_then(|d| {
                NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                    .ok()
                    .or_else(|| extract::find_date(d).and_then(|iso| iso.parse().ok()))
            })
            .unwrap_or(defaults.date);

        let purpose = self
            .purpose
            .as_deref()
            .and_then(|p| p.parse::<Purpose>().ok())
            .unwrap_or_default();

        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .or_else(|| defaults.description.clone())
            .unwrap_or_default();

        let amount = self.amount.or(defaults.amount);
        let mut is_valid = self.is_valid.unwrap_or(true);
        if amount.is_none() {
            if !notes.iter().any(|n| n.contains(AMOUNT_UNKNOWN_NOTE)) {
                notes.push(AMOUNT_UNKNOWN_NOTE.to_string());
            }
            is_valid = false;
        }

        ExpenseRecord {
            category,
            sub_category: self.sub_category.filter(|s| !s.trim().is_empty()),
            amount: amount.unwrap_or(0),
            date,
            description,
            purpose,
            is_valid,
            notes: notes.join(" / "),
            source_image: None,
        }
        .enforce_invariant()
    }
}

/// Result of running the repair chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Parsed without any syntactic change
    Direct(ClassificationReply),
    /// Parsed after comma repair
    Repaired(ClassificationReply),
    /// Every attempt failed; carries the last parser message
    Unrecoverable(String),
}

impl ParseOutcome {
    pub fn reply(&self) -> Option<&ClassificationReply> {
        match self {
            Self::Direct(r) | Self::Repaired(r) => Some(r),
            Self::Unrecoverable(_) => None,
        }
    }

    /// Convert into a record; unrecoverable input becomes the sentinel
    pub fn into_record(self, defaults: &ReplyDefaults) -> ExpenseRecord {
        match self {
            Self::Direct(reply) | Self::Repaired(reply) => reply.into_record(defaults),
            Self::Unrecoverable(message) => ExpenseRecord::parse_error(defaults.date, &message),
        }
    }
}

/// Step 1: remove code fences and anything outside the outermost braces
pub fn strip_fences(text: &str) -> String {
    let without_fences: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect();
    let joined = without_fences.join("\n");
    let trimmed = joined.trim();

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if s < e => trimmed[s..=e].to_string(),
        _ => trimmed.to_string(),
    }
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid regex"))
}

/// Step 3: drop a comma that directly precedes a closing brace or bracket
pub fn remove_trailing_commas(text: &str) -> String {
    trailing_comma_re().replace_all(text, "$1").into_owned()
}

fn ends_with_value(line: &str) -> bool {
    let line = line.trim_end();
    line.ends_with('"')
        || line.ends_with('}')
        || line.ends_with(']')
        || line.ends_with("true")
        || line.ends_with("false")
        || line.ends_with("null")
        || line.chars().last().is_some_and(|c| c.is_ascii_digit())
}

/// Step 4: add the separator between a value line and a following key line
pub fn insert_missing_commas(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        let next_key = lines[i + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .is_some_and(|l| l.starts_with('"'));

        let trimmed = line.trim_end();
        if next_key && !trimmed.trim_start().is_empty() && ends_with_value(trimmed) {
            out.push(format!("{},", trimmed));
        } else {
            out.push((*line).to_string());
        }
    }

    out.join("\n")
}

fn parse(text: &str) -> std::result::Result<ClassificationReply, serde_json::Error> {
    serde_json::from_str(text)
}

/// Run the repair chain over a raw reply
pub fn repair(raw: &str) -> ParseOutcome {
    let cleaned = strip_fences(raw);

    match parse(&cleaned) {
        Ok(reply) => return ParseOutcome::Direct(reply),
        Err(e) => debug!(error = %e, "Direct parse failed, attempting repair"),
    }

    let repaired = insert_missing_commas(&remove_trailing_commas(&cleaned));

    match parse(&repaired) {
        Ok(reply) => {
            debug!("Classification reply repaired");
            ParseOutcome::Repaired(reply)
        }
        Err(e) => {
            let truncated: String = repaired.chars().take(200).collect();
            warn!(error = %e, raw = %truncated, "Classification reply is unrecoverable");
            ParseOutcome::Unrecoverable(e.to_string())
        }
    }
}

/// Repair a reply straight into a record, dated `today` when the reply has no date
pub fn repair_record(raw: &str, today: NaiveDate) -> ExpenseRecord {
    repair(raw).into_record(&ReplyDefaults::dated(today))
}
