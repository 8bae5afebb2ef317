//! Document decoding, text normalization and operative-clause isolation.
//!
//! Pure functions, no async. Everything here is total: any byte string
//! decodes to some text, and non-empty input never yields an empty block.

use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1251};
use regex::{Captures, Regex};

/// Size of the tail window used when no operative-clause marker is found.
pub const RESOLUTION_TAIL_CHARS: usize = 3000;

/// Candidate encodings tried in order. The first one is also the lossy
/// last resort.
pub fn default_encodings() -> Vec<&'static Encoding> {
    vec![UTF_8, WINDOWS_1251]
}

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,9});").expect("entity regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

// Letter-spaced "УХВАЛИВ", "ВИРІШИВ", "ПОСТАНОВИВ".
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(у\s*х\s*в\s*а\s*л\s*и\s*в|в\s*и\s*р\s*і\s*ш\s*и\s*в|п\s*о\s*с\s*т\s*а\s*н\s*о\s*в\s*и\s*в)",
    )
    .expect("marker regex")
});

// ============================================================================
// Decoding
// ============================================================================

/// Decode raw document bytes with the first encoding that accepts them
/// without errors, falling back to a lossy decode with the first encoding.
pub fn decode_bytes(raw: &[u8], encodings: &[&'static Encoding]) -> String {
    for encoding in encodings {
        let bytes = if *encoding == UTF_8 {
            raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw)
        } else {
            raw
        };
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return text.into_owned();
        }
        tracing::debug!("Document is not valid {}", encoding.name());
    }

    let primary = encodings.first().copied().unwrap_or(UTF_8);
    let (text, _, _) = primary.decode(raw);
    text.into_owned()
}

// ============================================================================
// Normalization
// ============================================================================

/// Collapse markup and whitespace into canonical plain text.
pub fn normalize_text(text: &str) -> String {
    let unescaped = unescape_entities(text);
    let spaced = unescaped.replace('\u{a0}', " ");
    let untagged = TAG_RE.replace_all(&spaced, " ");
    let collapsed = WHITESPACE_RE.replace_all(&untagged, " ");
    collapsed.trim().to_string()
}

/// Replace HTML character references. Unknown named entities are kept.
pub fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            decode_entity(body).map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn decode_entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "laquo" => '«',
        "raquo" => '»',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "bdquo" => '„',
        "sect" => '§',
        "numero" => '№',
        "shy" => '\u{ad}',
        _ => return None,
    };
    Some(c)
}

// ============================================================================
// Char-window helpers
// ============================================================================

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

/// First `n` characters of `text`.
pub fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

// ============================================================================
// Operative clause
// ============================================================================

/// Isolate the operative clause of a decision.
///
/// Prefers the first marker followed closely by a colon or dash, else the
/// first marker at all, else the tail of the document.
pub fn extract_resolution_block(text: &str) -> String {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        // Nothing survived normalization; hand back the raw tail instead.
        return tail_chars(text, RESOLUTION_TAIL_CHARS).to_string();
    }

    let mut chosen = None;
    for m in MARKER_RE.find_iter(&normalized) {
        let lead: String = normalized[m.end()..].chars().take(6).collect();
        // A bare hyphen is part of a compound word; a dash is spaced.
        if lead.contains(':') || lead.contains(" -") || lead.contains('–') || lead.contains('—') {
            chosen = Some(m);
            break;
        }
        if chosen.is_none() {
            chosen = Some(m);
        }
    }

    if let Some(m) = chosen {
        let block = normalized[m.end()..].trim();
        if !block.is_empty() {
            return block.to_string();
        }
    }

    tail_chars(&normalized, RESOLUTION_TAIL_CHARS).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_markup() {
        let html = "<p>Рішення&nbsp;суду</p>\n\n<b>від&#160;03.02.2026</b> &amp; інше";
        assert_eq!(normalize_text(html), "Рішення суду від 03.02.2026 & інше");
    }

    #[test]
    fn test_escaped_tags_are_removed() {
        assert_eq!(normalize_text("a &lt;br&gt; b"), "a b");
    }

    #[test]
    fn test_unknown_entity_kept() {
        assert_eq!(unescape_entities("x &foo; y"), "x &foo; y");
        assert_eq!(unescape_entities("&#x41;&#66;"), "AB");
    }

    #[test]
    fn test_decode_utf8_and_cp1251() {
        let utf8 = "УХВАЛИВ".as_bytes();
        assert_eq!(decode_bytes(utf8, &default_encodings()), "УХВАЛИВ");

        let (cp1251, _, _) = WINDOWS_1251.encode("ухвалив");
        assert_eq!(decode_bytes(&cp1251, &default_encodings()), "ухвалив");
    }

    #[test]
    fn test_decode_lossy_last_resort() {
        let decoded = decode_bytes(&[0x41, 0xFF, 0x42], &[UTF_8]);
        assert!(decoded.starts_with('A'));
        assert!(decoded.ends_with('B'));
        assert!(decoded.contains('\u{fffd}'));
    }

    #[test]
    fn test_block_prefers_marker_with_colon() {
        let text = "суд ухвалив рішення раніше. Далі текст. УХВАЛИВ: Позов задовольнити.";
        assert_eq!(extract_resolution_block(text), ": Позов задовольнити.");
    }

    #[test]
    fn test_block_letter_spaced_marker() {
        let text = "Мотивувальна частина. В И Р І Ш И В : у задоволенні позову відмовити.";
        assert_eq!(extract_resolution_block(text), ": у задоволенні позову відмовити.");
    }

    #[test]
    fn test_block_hyphenated_word_is_not_a_dash() {
        let text = "Суд ухвалив-таки рішення. УХВАЛИВ - позов задовольнити.";
        assert_eq!(extract_resolution_block(text), "- позов задовольнити.");
    }

    #[test]
    fn test_block_first_marker_without_punctuation() {
        let text = "Суд постановив стягнути борг. Кінець.";
        assert_eq!(extract_resolution_block(text), "стягнути борг. Кінець.");
    }

    #[test]
    fn test_block_tail_window_without_marker() {
        let text = "а".repeat(5000);
        let block = extract_resolution_block(&text);
        assert_eq!(block.chars().count(), RESOLUTION_TAIL_CHARS);
    }

    #[test]
    fn test_block_never_empty() {
        for input in ["УХВАЛИВ:", "<br>", "   ", "x", "<p></p>&nbsp;"] {
            assert!(!extract_resolution_block(input).is_empty(), "empty for {:?}", input);
        }
    }

    #[test]
    fn test_char_windows() {
        assert_eq!(tail_chars("абвгд", 2), "гд");
        assert_eq!(head_chars("абвгд", 2), "аб");
        assert_eq!(tail_chars("аб", 5), "аб");
    }
}
