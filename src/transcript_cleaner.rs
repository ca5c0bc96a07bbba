// src/transcript_cleaner.rs
//
// Deterministic cleanup of raw speech-to-text output before terminology
// correction: filler words, stutter repetitions, hesitation markers and
// the usual punctuation/whitespace noise. Output is normalized to
// single-spaced text.

use log::info;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

static FILLER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b(um|uh|er|erm)\b",
        r"\byou know\b",
        r"\bi mean\b",
        r"\bkind of\b",
        r"\bsort of\b",
        r"\bbasically\b",
        r"\bliterally\b",
    ]
    .iter()
    .map(|p| {
        RegexBuilder::new(p)
            .case_insensitive(true)
            .build()
            .expect("filler pattern must compile")
    })
    .collect()
});

static HESITATIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\.{2,}|-{2,}|…)").unwrap());

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static MULTI_PERIOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").unwrap());

static DUP_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*,)+").unwrap());

static SPACE_BEFORE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([,.;:!?])").unwrap());

static MISSING_SPACE_AFTER_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w)([,.;:!?])(\w)").unwrap());

static SENTENCE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?]\s+)([a-z])").unwrap());

/// Clean and normalize a transcript to improve readability.
pub fn clean_transcript(transcript: &str) -> String {
    let mut text = transcript.to_string();

    for pattern in FILLER_PATTERNS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }

    text = collapse_repeated_words(&text);

    text = HESITATIONS.replace_all(&text, ". ").into_owned();
    text = MULTI_SPACE.replace_all(&text, " ").into_owned();
    text = MULTI_PERIOD.replace_all(&text, ".").into_owned();
    text = DUP_COMMA.replace_all(&text, ",").into_owned();
    text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1").into_owned();
    text = MISSING_SPACE_AFTER_PUNCT.replace_all(&text, "$1$2 $3").into_owned();

    // Sentences start with a capital letter
    text = SENTENCE_START
        .replace_all(&text, |caps: &regex::Captures| {
            format!("{}{}", &caps[1], caps[2].to_uppercase())
        })
        .into_owned();

    let cleaned = text.trim().to_string();
    info!(
        "[TranscriptCleaner] Cleaned transcript: {} -> {} characters",
        transcript.len(),
        cleaned.len()
    );
    cleaned
}

/// Collapse immediate word repetitions ("the the launchpad" -> "the
/// launchpad"). Comparison is case-insensitive and ignores surrounding
/// punctuation; only a bare repeat is dropped so punctuation survives.
fn collapse_repeated_words(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for token in text.split_whitespace() {
        if let Some(prev) = out.last() {
            let norm = normalize_token(token);
            if !norm.is_empty()
                && norm == normalize_token(prev)
                && token.chars().all(|c| c.is_alphanumeric() || c == '\'')
            {
                continue;
            }
        }
        out.push(token);
    }
    out.join(" ")
}

fn normalize_token(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}
