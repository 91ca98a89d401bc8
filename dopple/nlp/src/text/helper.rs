use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[^.!?\n]+(?:[.!?]+|$)").expect("sentence regex"));

/// Normalizes whitespace and lowercases content.
#[must_use]
pub fn normalize(text: &str) -> String {
    WHITESPACE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// Splits text into sentences on terminal punctuation and line breaks.
/// Trailing text without punctuation counts as a sentence.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercased alphanumeric words.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_hangul(c: char) -> bool {
    ('\u{3131}'..='\u{D79D}').contains(&c)
}

/// Rough token count of a text: half a token per Hangul character and a
/// quarter per any other character, rounded up.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let (hangul, other) = text.chars().fold((0_usize, 0_usize), |(h, o), c| {
        if is_hangul(c) {
            (h + 1, o)
        } else {
            (h, o + 1)
        }
    });
    (hangul * 2 + other).div_ceil(4)
}

/// Truncates `text` to at most `max_chars` characters on a char boundary,
/// preferring to cut at the last whitespace.
#[must_use]
pub fn fit_to_budget(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => cut[..idx].trim_end().to_string(),
        _ => cut,
    }
}
