//! Regex fact extraction, the path used when no model answer is available.
//!
//! Each field has an ordered list of strategies; the first one that yields a
//! parseable value wins. Every hit carries a short snippet of the text around
//! the match so a reviewer can see what was read.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use crate::parse::{parse_amount, parse_date};
use crate::schema::{
    ExecutionDocAnalysisResult, Extracted, ExtractionMode, REGEX_COURT_FEE_CONFIDENCE,
    REGEX_ISSUE_DATE_CONFIDENCE, REGEX_LEGAL_AID_CONFIDENCE, REGEX_MAIN_AMOUNT_CONFIDENCE,
};
use crate::text::{normalize_text, tail_chars};

/// The regex path only looks at this many trailing normalized characters.
pub const FALLBACK_WINDOW_CHARS: usize = 12_000;

const SNIPPET_PAD_CHARS: usize = 80;
const KEYWORD_LOOKBEHIND_CHARS: usize = 220;
const KEYWORD_LOOKAHEAD_CHARS: usize = 180;
const ISSUE_DATE_CONTEXT_CHARS: usize = 90;

static DEBT_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)заборгован(?:ість|ості).{0,500}?у\s+розмірі\s*([0-9][0-9\s.,]*)")
        .expect("debt amount regex")
});

static TOTAL_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)загальн(?:у|ої)\s+сум[ауи].{0,120}?([0-9][0-9\s.,]*)")
        .expect("total amount regex")
});

static COURT_FEE_EXPLICIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)судов(?:ий|ого|і|их)\s+(?:збір|витрат).{0,180}?([0-9][0-9\s.,]*)\s*(?:грн\.?|грив[а-я]*)",
    )
    .expect("court fee regex")
});

static COURT_FEE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)судов(?:ий|ого|і|их)\s+(?:збір|витрат)").expect("court fee keyword regex")
});

static LEGAL_AID_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)правнич(?:у|ої|а)\s+допомог").expect("legal aid keyword regex")
});

// A number followed by the hryvnia suffix, optionally with the amount in
// words in parentheses between them.
static CURRENCY_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([0-9][0-9\s.,]*)(?:\s*\([^)]{1,120}\))?\s*(?:грн\.?|грив[а-я]*)")
        .expect("currency amount regex")
});

static ISSUED_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:Виконавч(?:ий|ого)\s+лист(?:а)?\s+видан[оаі]\s*:?\s*)([^<\n]{0,120})")
        .expect("issued label regex")
});

static ISSUE_DATE_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:Дата\s+видачі\s+виконавч(?:ого|ий)\s+лист(?:а)?\s*:?\s*)([^<\n]{0,120})",
    )
    .expect("issue date label regex")
});

static DOTTED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}\.\d{1,2}\.\d{4})").expect("dotted token regex"));

// ============================================================================
// Strategies
// ============================================================================

/// A value found in the text with its audit excerpt.
#[derive(Debug, Clone, PartialEq)]
struct Hit<T> {
    value: T,
    snippet: String,
}

/// One way of locating an amount.
#[derive(Debug, Clone, Copy)]
pub enum AmountStrategy {
    /// Pattern whose first capture group is the amount.
    Anchored(&'static Regex),
    /// Currency-suffixed amount nearest to a keyword occurrence.
    NearKeyword(&'static Regex),
}

impl AmountStrategy {
    fn find(&self, text: &str) -> Option<Hit<Decimal>> {
        match self {
            AmountStrategy::Anchored(re) => re.captures_iter(text).find_map(|caps| {
                let value = parse_amount(caps.get(1)?.as_str())?;
                let whole = caps.get(0)?;
                Some(Hit {
                    value,
                    snippet: build_snippet(text, whole.start(), whole.end()),
                })
            }),
            AmountStrategy::NearKeyword(keyword) => find_near_keyword(text, keyword),
        }
    }
}

/// One way of locating the execution document issue date.
#[derive(Debug, Clone, Copy)]
pub enum DateStrategy {
    /// Label pattern whose first capture group contains the date.
    Labeled(&'static Regex),
    /// First dotted date whose left context mentions issuing the writ.
    IssueContext,
}

impl DateStrategy {
    fn find(&self, text: &str) -> Option<Hit<NaiveDate>> {
        match self {
            DateStrategy::Labeled(re) => re.captures_iter(text).find_map(|caps| {
                let value = parse_date(caps.get(1)?.as_str())?;
                let whole = caps.get(0)?;
                Some(Hit {
                    value,
                    snippet: build_snippet(text, whole.start(), whole.end()),
                })
            }),
            DateStrategy::IssueContext => DOTTED_TOKEN_RE.find_iter(text).find_map(|m| {
                let (left, _) = expand_window(text, m.start(), m.start(), ISSUE_DATE_CONTEXT_CHARS, 0);
                let context = text[left..m.start()].to_lowercase();
                if !context.contains("виконавч") {
                    return None;
                }
                if !context.contains("видан") && !context.contains("видач") {
                    return None;
                }
                Some(Hit {
                    value: parse_date(m.as_str())?,
                    snippet: build_snippet(text, m.start(), m.end()),
                })
            }),
        }
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Pattern and keyword-proximity extraction of execution document facts.
#[derive(Debug, Clone)]
pub struct RegexFactExtractor {
    main_amount: Vec<AmountStrategy>,
    court_fee: Vec<AmountStrategy>,
    legal_aid: Vec<AmountStrategy>,
    issue_date: Vec<DateStrategy>,
}

impl Default for RegexFactExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexFactExtractor {
    pub fn new() -> Self {
        Self {
            main_amount: vec![
                AmountStrategy::Anchored(&DEBT_AMOUNT_RE),
                AmountStrategy::Anchored(&TOTAL_AMOUNT_RE),
            ],
            court_fee: vec![
                AmountStrategy::Anchored(&COURT_FEE_EXPLICIT_RE),
                AmountStrategy::NearKeyword(&COURT_FEE_KEYWORD_RE),
            ],
            legal_aid: vec![AmountStrategy::NearKeyword(&LEGAL_AID_KEYWORD_RE)],
            issue_date: vec![
                DateStrategy::Labeled(&ISSUED_LABEL_RE),
                DateStrategy::Labeled(&ISSUE_DATE_LABEL_RE),
                DateStrategy::IssueContext,
            ],
        }
    }

    /// Extract all fields from raw document text. The result is always in
    /// `fallback` mode with every populated field sourced from regex.
    pub fn extract(&self, text: &str) -> ExecutionDocAnalysisResult {
        let normalized = normalize_text(text);
        let window = tail_chars(&normalized, FALLBACK_WINDOW_CHARS);

        let result = ExecutionDocAnalysisResult {
            main_amount: first_amount(&self.main_amount, window, REGEX_MAIN_AMOUNT_CONFIDENCE),
            court_fee: first_amount(&self.court_fee, window, REGEX_COURT_FEE_CONFIDENCE),
            legal_aid: first_amount(&self.legal_aid, window, REGEX_LEGAL_AID_CONFIDENCE),
            execution_doc_issue_date: self
                .issue_date
                .iter()
                .find_map(|s| s.find(window))
                .map(|hit| Extracted::regex(hit.value, REGEX_ISSUE_DATE_CONFIDENCE, Some(hit.snippet))),
            mode: ExtractionMode::Fallback,
        };

        debug!(
            "Regex extraction: {} of 4 fields found in {} chars",
            result.populated_sources().len(),
            window.chars().count()
        );
        result
    }
}

fn first_amount(
    strategies: &[AmountStrategy],
    text: &str,
    confidence: f64,
) -> Option<Extracted<Decimal>> {
    strategies
        .iter()
        .find_map(|s| s.find(text))
        .map(|hit| Extracted::regex(hit.value, confidence, Some(hit.snippet)))
}

/// Scan keyword occurrences in order; the first one with any amount in its
/// window decides, taking the amount whose start is nearest to the keyword
/// start (leftmost on ties).
fn find_near_keyword(text: &str, keyword: &Regex) -> Option<Hit<Decimal>> {
    for k in keyword.find_iter(text) {
        let (start, end) = expand_window(
            text,
            k.start(),
            k.end(),
            KEYWORD_LOOKBEHIND_CHARS,
            KEYWORD_LOOKAHEAD_CHARS,
        );
        let window = &text[start..end];

        let nearest = CURRENCY_AMOUNT_RE
            .captures_iter(window)
            .filter_map(|caps| {
                let value = parse_amount(caps.get(1)?.as_str())?;
                let whole = caps.get(0)?;
                let abs_start = start + whole.start();
                let abs_end = start + whole.end();
                Some((char_distance(text, abs_start, k.start()), value, abs_start, abs_end))
            })
            .min_by_key(|(distance, ..)| *distance);

        if let Some((_, value, abs_start, abs_end)) = nearest {
            return Some(Hit {
                value,
                snippet: build_snippet(text, abs_start, abs_end),
            });
        }
    }
    None
}

// ============================================================================
// Char-window helpers
// ============================================================================

/// Widen the byte range `start..end` by `before` chars to the left and
/// `after` chars to the right, clamped to the text.
fn expand_window(text: &str, start: usize, end: usize, before: usize, after: usize) -> (usize, usize) {
    let left = text[..start]
        .char_indices()
        .rev()
        .take(before)
        .last()
        .map_or(start, |(i, _)| i);
    let right = text[end..]
        .char_indices()
        .nth(after)
        .map_or(text.len(), |(i, _)| end + i);
    (left, right)
}

fn char_distance(text: &str, a: usize, b: usize) -> usize {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    text[lo..hi].chars().count()
}

fn build_snippet(text: &str, start: usize, end: usize) -> String {
    let (left, right) = expand_window(text, start, end, SNIPPET_PAD_CHARS, SNIPPET_PAD_CHARS);
    text[left..right].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSource;
    use std::str::FromStr;

    const WRIT: &str = "<p>ВИКОНАВЧИЙ ЛИСТ</p><p>Стягнути з боржника на користь стягувача \
        заборгованість за кредитним договором у розмірі 12724 грн, а також витрати, \
        пов'язані з розглядом справи: правнича допомога 4000 грн.</p>\
        <p>Стягнути судовий збір 2422.40 грн.</p><p>Виконавчий лист видано 03.02.2026.</p>";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_fallback_end_to_end() {
        let result = RegexFactExtractor::new().extract(WRIT);

        assert_eq!(result.mode, ExtractionMode::Fallback);
        assert_eq!(result.main_amount_value(), Some(dec("12724")));
        assert_eq!(result.court_fee_value(), Some(dec("2422.40")));
        assert_eq!(result.legal_aid_value(), Some(dec("4000")));
        assert_eq!(result.issue_date_value(), NaiveDate::from_ymd_opt(2026, 2, 3));
        assert_eq!(result.populated_sources(), vec![FieldSource::Regex; 4]);

        let main = result.main_amount.unwrap();
        assert_eq!(main.provenance.confidence, REGEX_MAIN_AMOUNT_CONFIDENCE);
        assert!(main.provenance.snippet.unwrap().contains("12724"));
        let date = result.execution_doc_issue_date.unwrap();
        assert_eq!(date.provenance.confidence, REGEX_ISSUE_DATE_CONFIDENCE);
    }

    #[test]
    fn test_nothing_found_is_all_absent() {
        let result = RegexFactExtractor::new().extract("Текст без фактів.");
        assert!(result.populated_sources().is_empty());
        assert_eq!(result.mode, ExtractionMode::Fallback);
    }

    #[test]
    fn test_total_sum_pattern_used_when_no_debt_phrase() {
        let result = RegexFactExtractor::new().extract("Стягнути загальну суму 1 500,50 грн.");
        assert_eq!(result.main_amount_value(), Some(dec("1500.50")));
    }

    #[test]
    fn test_court_fee_by_proximity_when_amount_precedes_keyword() {
        let text = "Стягнути 3028 грн (три тисячі двадцять вісім гривень) як судовий збір.";
        let result = RegexFactExtractor::new().extract(text);
        assert_eq!(result.court_fee_value(), Some(dec("3028")));
    }

    #[test]
    fn test_proximity_prefers_nearest_amount() {
        let text = "Сума 100 грн. Також 250 грн правничої допомоги, потім ще 900 грн окремо.";
        let hit = find_near_keyword(text, &LEGAL_AID_KEYWORD_RE).unwrap();
        assert_eq!(hit.value, dec("250"));
    }

    #[test]
    fn test_proximity_tie_goes_to_leftmost() {
        // Both amounts start 19 chars away from the keyword start.
        let text = "11 грн xxxxxxxxxxx правничої допомоги 22 грн";
        let keyword_start = text.find("правничої").unwrap();
        let right_start = text.find("22").unwrap();
        assert_eq!(char_distance(text, 0, keyword_start), char_distance(text, keyword_start, right_start));
        let hit = find_near_keyword(text, &LEGAL_AID_KEYWORD_RE).unwrap();
        assert_eq!(hit.value, dec("11"));
    }

    #[test]
    fn test_issue_date_from_context() {
        let text = "Цей виконавчий документ було видано боржнику 15.01.2026 у приміщенні суду. Рішення від 01.12.2025.";
        let result = RegexFactExtractor::new().extract(text);
        assert_eq!(result.issue_date_value(), NaiveDate::from_ymd_opt(2026, 1, 15));
    }

    #[test]
    fn test_issue_date_ignores_unrelated_dates() {
        let text = "Рішення суду від 01.12.2025 набрало законної сили 05.01.2026.";
        let result = RegexFactExtractor::new().extract(text);
        assert_eq!(result.execution_doc_issue_date, None);
    }

    #[test]
    fn test_issue_date_label_with_worded_date() {
        let text = "Дата видачі виконавчого листа: 3 лютого 2026 року";
        let result = RegexFactExtractor::new().extract(text);
        assert_eq!(result.issue_date_value(), NaiveDate::from_ymd_opt(2026, 2, 3));
    }

    #[test]
    fn test_window_limits_search_to_tail() {
        let head = "заборгованість у розмірі 999 грн. ";
        let filler = "х".repeat(FALLBACK_WINDOW_CHARS + 10);
        let result = RegexFactExtractor::new().extract(&format!("{}{}", head, filler));
        assert_eq!(result.main_amount, None);
    }

    #[test]
    fn test_snippet_is_bounded() {
        let text = format!("{} судовий збір 10 грн {}", "а".repeat(500), "б".repeat(500));
        let hit = AmountStrategy::Anchored(&COURT_FEE_EXPLICIT_RE).find(&text).unwrap();
        assert!(hit.snippet.chars().count() <= "судовий збір 10 грн".chars().count() + 2 * SNIPPET_PAD_CHARS);
        assert!(hit.snippet.contains("судовий збір 10 грн"));
    }

    #[test]
    fn test_expand_window_handles_multibyte() {
        let text = "абвгд";
        let start = text.char_indices().nth(2).unwrap().0;
        let end = text.char_indices().nth(3).unwrap().0;
        let (l, r) = expand_window(text, start, end, 1, 1);
        assert_eq!(&text[l..r], "бвг");
        let (l, r) = expand_window(text, start, end, 10, 10);
        assert_eq!(&text[l..r], text);
    }
}
