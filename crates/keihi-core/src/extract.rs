//! Field extraction from raw evidence
//!
//! Turns a free-text entry (`タクシー代 2024年3月13日 ¥1,500 東京駅から会社まで`)
//! or OCR output into an [`ExpenseCandidate`]. Extraction never fails: fields
//! that cannot be found are left as `None` and the description falls back to
//! the full input text.

use std::ops::Range;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use crate::models::{parse_amount_digits, ExpenseCandidate, SourceHint};

/// Date patterns, each with (year, month, day) capture groups
fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            // 2024年3月13日
            Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").expect("valid regex"),
            // 2024-03-13, 2024/3/13, 2024.3.13
            Regex::new(r"(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})").expect("valid regex"),
        ]
    })
}

/// 令和6年3月13日 (Reiwa era, year 1 = 2019)
fn reiwa_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"令和\s*(\d{1,2}|元)\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").expect("valid regex")
    })
}

/// Amount patterns in priority order
fn amount_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"[¥￥]\s*\d[\d,，]*").expect("valid regex"),
            Regex::new(r"\d[\d,，]*\s*円").expect("valid regex"),
            Regex::new(r"金額\s*[:：]?\s*\d[\d,，]*").expect("valid regex"),
            Regex::new(r"合計\s*[:：]?\s*\d[\d,，]*").expect("valid regex"),
        ]
    })
}

/// A date found in text, with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
struct DateMatch {
    date: NaiveDate,
    span: Range<usize>,
}

/// Find the first plausible calendar date by position
///
/// Substrings that look like dates but are not real calendar days
/// (e.g. `2024-13-45`) are skipped in favour of the next candidate.
fn find_date_match(text: &str) -> Option<DateMatch> {
    let mut found: Vec<DateMatch> = Vec::new();

    for re in date_patterns() {
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(y), Some(m), Some(d)) =
                (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
            else {
                continue;
            };
            if let Some(date) = ymd(y.as_str(), m.as_str(), d.as_str()) {
                found.push(DateMatch {
                    date,
                    span: whole.range(),
                });
            }
        }
    }

    for caps in reiwa_pattern().captures_iter(text) {
        let (Some(whole), Some(y), Some(m), Some(d)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let era_year: i32 = if y.as_str() == "元" {
            1
        } else {
            match y.as_str().parse() {
                Ok(n) => n,
                Err(_) => continue,
            }
        };
        if let Some(date) = ymd(&(2018 + era_year).to_string(), m.as_str(), d.as_str()) {
            found.push(DateMatch {
                date,
                span: whole.range(),
            });
        }
    }

    found.into_iter().min_by_key(|m| m.span.start)
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
}

/// Find the first plausible date in `text`, formatted as YYYY-MM-DD
pub fn find_date(text: &str) -> Option<String> {
    find_date_match(text).map(|m| m.date.format("%Y-%m-%d").to_string())
}

/// Find the first amount token by position (interactive entries)
fn find_first_amount(text: &str) -> Option<(String, Range<usize>)> {
    amount_patterns()
        .iter()
        .flat_map(|re| re.find_iter(text))
        .filter(|m| parse_amount_digits(m.as_str()).is_some())
        .min_by_key(|m| m.start())
        .map(|m| (m.as_str().trim().to_string(), m.range()))
}

/// Find the receipt amount (OCR text)
///
/// Uses the first pattern that matches anything and picks its largest value,
/// since a receipt's total is normally the biggest yen figure printed.
pub fn find_receipt_amount(text: &str) -> Option<String> {
    for re in amount_patterns() {
        let best = re
            .find_iter(text)
            .filter_map(|m| parse_amount_digits(m.as_str()).map(|v| (v, m.as_str())))
            .max_by_key(|(v, _)| *v);
        if let Some((value, token)) = best {
            debug!(amount = value, "Amount found in receipt text");
            return Some(token.trim().to_string());
        }
    }
    None
}

fn is_bare_number(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '，')
}

/// Remove the given byte ranges from `text`, replacing each with a space
fn cut_spans(text: &str, spans: &mut [Range<usize>]) -> String {
    spans.sort_by_key(|s| s.start);
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for span in spans.iter() {
        if span.start < pos {
            continue;
        }
        out.push_str(&text[pos..span.start]);
        out.push(' ');
        pos = span.end;
    }
    out.push_str(&text[pos..]);
    out
}

/// Extract a candidate from an interactive entry
///
/// Expected shape is `項目名 日付 金額 詳細説明`, but any order works: the date
/// and amount are located by pattern, the first remaining word becomes the
/// description and the rest becomes the detail.
pub fn extract_interactive(text: &str) -> ExpenseCandidate {
    let text = text.trim();
    let mut spans = Vec::new();

    let date = find_date_match(text);
    if let Some(ref m) = date {
        spans.push(m.span.clone());
    }

    let mut raw_amount = None;
    if let Some((token, span)) = find_first_amount(text) {
        raw_amount = Some(token);
        spans.push(span);
    }

    let rest = cut_spans(text, &mut spans);
    let mut words: Vec<&str> = rest.split_whitespace().collect();

    if raw_amount.is_none() {
        if let Some(idx) = words.iter().position(|w| is_bare_number(w)) {
            raw_amount = Some(words.remove(idx).to_string());
        }
    }

    let (raw_description, raw_detail) = match words.split_first() {
        Some((first, rest)) => {
            let detail = rest.join(" ");
            (
                first.to_string(),
                if detail.is_empty() { None } else { Some(detail) },
            )
        }
        None => (text.to_string(), None),
    };

    ExpenseCandidate {
        raw_description,
        raw_date: date.map(|m| m.date.format("%Y-%m-%d").to_string()),
        raw_amount,
        raw_detail,
        source_hint: SourceHint::Interactive,
        source_path: None,
        raw_text: text.to_string(),
    }
}

/// Extract a candidate from OCR output
///
/// The first non-empty line is usually the shop name, so it becomes the
/// description.
pub fn extract_ocr(text: &str, source_path: Option<&str>) -> ExpenseCandidate {
    let raw_description = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| text.trim().to_string());

    ExpenseCandidate {
        raw_description,
        raw_date: find_date(text),
        raw_amount: find_receipt_amount(text),
        raw_detail: None,
        source_hint: SourceHint::Ocr,
        source_path: source_path.map(str::to_string),
        raw_text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_full_entry() {
        let c = extract_interactive("タクシー代 2024年3月13日 ¥1,500 東京駅から会社まで");
        assert_eq!(c.raw_description, "タクシー代");
        assert_eq!(c.raw_date.as_deref(), Some("2024-03-13"));
        assert_eq!(c.raw_amount.as_deref(), Some("¥1,500"));
        assert_eq!(c.amount_value(), Some(1500));
        assert_eq!(c.raw_detail.as_deref(), Some("東京駅から会社まで"));
        assert_eq!(c.source_hint, SourceHint::Interactive);
    }

    #[test]
    fn test_interactive_iso_date_and_yen_suffix() {
        let c = extract_interactive("昼食代 2024-03-13 2,800円");
        assert_eq!(c.raw_description, "昼食代");
        assert_eq!(c.raw_date.as_deref(), Some("2024-03-13"));
        assert_eq!(c.amount_value(), Some(2800));
        assert_eq!(c.raw_detail, None);
    }

    #[test]
    fn test_interactive_bare_number_amount() {
        let c = extract_interactive("文房具 2024/3/14 3200 ボールペン");
        assert_eq!(c.raw_amount.as_deref(), Some("3200"));
        assert_eq!(c.raw_description, "文房具");
        assert_eq!(c.raw_detail.as_deref(), Some("ボールペン"));
    }

    #[test]
    fn test_missing_amount_is_none() {
        let c = extract_interactive("会議室利用料 2024-03-13");
        assert_eq!(c.raw_amount, None);
        assert_eq!(c.amount_value(), None);
        assert_eq!(c.raw_description, "会議室利用料");
    }

    #[test]
    fn test_garbage_falls_back_to_full_text() {
        let c = extract_interactive("   ");
        assert_eq!(c.raw_description, "");
        assert_eq!(c.raw_date, None);
        assert_eq!(c.raw_amount, None);

        let c = extract_interactive("¥500");
        assert_eq!(c.raw_description, "¥500");
        assert_eq!(c.amount_value(), Some(500));
    }

    #[test]
    fn test_first_plausible_date_by_position() {
        // 2024-13-40 is not a calendar date, so the later one wins
        assert_eq!(
            find_date("発行 2024-13-40 利用日 2024年3月13日 期限 2024-04-30").as_deref(),
            Some("2024-03-13")
        );
        // Earlier position wins across patterns
        assert_eq!(
            find_date("2024/02/01 と 2024年3月13日").as_deref(),
            Some("2024-02-01")
        );
    }

    #[test]
    fn test_reiwa_date() {
        assert_eq!(find_date("令和6年3月13日").as_deref(), Some("2024-03-13"));
        assert_eq!(find_date("令和元年5月1日").as_deref(), Some("2019-05-01"));
    }

    #[test]
    fn test_receipt_amount_picks_largest_of_first_pattern() {
        let text = "コンビニ東京店\n2024年3月13日\nおにぎり ¥150\nお茶 ¥130\n合計 ¥280\n";
        assert_eq!(find_receipt_amount(text).as_deref(), Some("¥280"));
    }

    #[test]
    fn test_receipt_amount_yen_suffix_and_fullwidth_symbol() {
        assert_eq!(find_receipt_amount("ご利用金額 1,500円").as_deref(), Some("1,500円"));
        assert_eq!(find_receipt_amount("￥12,000").as_deref(), Some("￥12,000"));
        assert_eq!(find_receipt_amount("領収書"), None);
    }

    #[test]
    fn test_extract_ocr() {
        let text = "\n  ホテル新宿  \n2024年3月12日\n宿泊料 ¥9,800\n";
        let c = extract_ocr(text, Some("receipts/pending/hotel.png"));
        assert_eq!(c.raw_description, "ホテル新宿");
        assert_eq!(c.raw_date.as_deref(), Some("2024-03-12"));
        assert_eq!(c.amount_value(), Some(9800));
        assert_eq!(c.source_hint, SourceHint::Ocr);
        assert_eq!(c.source_path.as_deref(), Some("receipts/pending/hotel.png"));
    }

    #[test]
    fn test_extract_ocr_empty_text() {
        let c = extract_ocr("", None);
        assert_eq!(c.raw_description, "");
        assert_eq!(c.raw_date, None);
        assert_eq!(c.raw_amount, None);
    }
}
