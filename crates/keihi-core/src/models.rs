//! Domain models for Keihi

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Description used by the sentinel record when a reply cannot be parsed
pub const PARSE_ERROR_DESCRIPTION: &str = "解析エラー";

/// Description used by the sentinel record when the classification call fails
pub const SERVICE_ERROR_DESCRIPTION: &str = "分類エラー";

/// Largest amount accepted from a receipt or a reply, in yen
pub const MAX_AMOUNT: u64 = 999_999_999_999;

/// Expense category
///
/// A closed set plus the `Error` sentinel. Serialized as the Japanese label
/// so the ledger and the classification replies share one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "交通費")]
    Transport,
    #[serde(rename = "宿泊費")]
    Lodging,
    #[serde(rename = "飲食費")]
    Meals,
    #[serde(rename = "消耗品費")]
    Supplies,
    #[serde(rename = "会議費")]
    Meetings,
    #[serde(rename = "その他")]
    Other,
    #[serde(rename = "エラー")]
    Error,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "交通費",
            Self::Lodging => "宿泊費",
            Self::Meals => "飲食費",
            Self::Supplies => "消耗品費",
            Self::Meetings => "会議費",
            Self::Other => "その他",
            Self::Error => "エラー",
        }
    }

    /// Categories a classifier may assign (excludes the sentinel)
    pub fn taxonomy() -> &'static [Category] {
        &[
            Self::Transport,
            Self::Lodging,
            Self::Meals,
            Self::Supplies,
            Self::Meetings,
            Self::Other,
        ]
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "交通費" => return Ok(Self::Transport),
            "宿泊費" => return Ok(Self::Lodging),
            "飲食費" => return Ok(Self::Meals),
            "消耗品費" => return Ok(Self::Supplies),
            "会議費" => return Ok(Self::Meetings),
            "その他" => return Ok(Self::Other),
            "エラー" => return Ok(Self::Error),
            _ => {}
        }
        match s.to_lowercase().as_str() {
            "transport" | "transportation" | "travel" => Ok(Self::Transport),
            "lodging" | "hotel" | "accommodation" => Ok(Self::Lodging),
            "meals" | "food" | "dining" => Ok(Self::Meals),
            "supplies" | "consumables" => Ok(Self::Supplies),
            "meetings" | "meeting" | "conference" => Ok(Self::Meetings),
            "other" | "misc" => Ok(Self::Other),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why the money was spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Business,
    Personal,
    #[default]
    Unknown,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Personal => "personal",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "business" | "業務" | "仕事" => Ok(Self::Business),
            "personal" | "private" | "個人" | "私用" => Ok(Self::Personal),
            "unknown" | "" | "不明" => Ok(Self::Unknown),
            _ => Err(format!("Unknown purpose: {}", s)),
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceHint {
    /// Typed by the user
    Interactive,
    /// Text recognized from a receipt image
    Ocr,
}

impl SourceHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Ocr => "ocr",
        }
    }
}

/// Unvalidated expense data pulled out of free text or OCR output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseCandidate {
    /// Item name or shop name; the whole input when nothing better was found
    pub raw_description: String,
    /// First plausible date, normalized to YYYY-MM-DD
    pub raw_date: Option<String>,
    /// Amount token as it appeared (e.g. "¥1,500")
    pub raw_amount: Option<String>,
    /// Remaining free text (interactive entries only)
    pub raw_detail: Option<String>,
    pub source_hint: SourceHint,
    pub source_path: Option<String>,
    /// Full evidence text the candidate was built from
    pub raw_text: String,
}

impl ExpenseCandidate {
    /// Amount with currency symbols and separators stripped
    pub fn amount_value(&self) -> Option<u64> {
        self.raw_amount.as_deref().and_then(parse_amount_digits)
    }

    pub fn date_value(&self) -> Option<NaiveDate> {
        self.raw_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }
}

/// Strip every non-digit character and parse what is left
///
/// Values above [`MAX_AMOUNT`] are treated as unreadable.
pub fn parse_amount_digits(s: &str) -> Option<u64> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok().filter(|v| *v <= MAX_AMOUNT)
}

/// A classified expense
///
/// `is_valid == false` always goes together with `Category::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub category: Category,
    pub sub_category: Option<String>,
    /// Whole yen
    pub amount: u64,
    pub date: NaiveDate,
    pub description: String,
    pub purpose: Purpose,
    pub is_valid: bool,
    pub notes: String,
    pub source_image: Option<String>,
}

impl ExpenseRecord {
    /// The placeholder emitted when no valid classification could be produced
    pub fn sentinel(date: NaiveDate, description: &str, notes: impl Into<String>) -> Self {
        Self {
            category: Category::Error,
            sub_category: None,
            amount: 0,
            date,
            description: description.to_string(),
            purpose: Purpose::Unknown,
            is_valid: false,
            notes: notes.into(),
            source_image: None,
        }
    }

    /// Sentinel for a reply that could not be repaired
    pub fn parse_error(date: NaiveDate, message: &str) -> Self {
        Self::sentinel(
            date,
            PARSE_ERROR_DESCRIPTION,
            format!("JSONパースエラー: {}", message),
        )
    }

    /// Sentinel for a failed classification call
    pub fn service_error(date: NaiveDate, message: &str) -> Self {
        Self::sentinel(
            date,
            SERVICE_ERROR_DESCRIPTION,
            format!("分類サービスエラー: {}", message),
        )
    }

    pub fn is_sentinel(&self) -> bool {
        self.category.is_error()
    }

    /// Bring `is_valid` and `category` into agreement
    pub fn enforce_invariant(mut self) -> Self {
        if !self.is_valid || self.category.is_error() {
            self.is_valid = false;
            self.category = Category::Error;
        }
        self
    }
}
