// src/json_utils.rs
//
// Tolerant extraction of JSON from LLM text output. Models wrap JSON in
// markdown code fences or surround it with commentary often enough that a
// direct serde_json parse is only the first attempt, not the only one.

use log::{debug, warn};
use serde_json::Value;

/// Attempt to parse a JSON value embedded in raw LLM output.
///
/// Strategies, in order: direct parse; strip markdown code fences; extract
/// the outermost `{...}` span; extract the outermost `[...]` span. Returns
/// None when every strategy fails. The caller decides what "no JSON" means;
/// this function never panics or errors.
pub fn parse_json_from_llm(llm_output: &str, description: &str) -> Option<Value> {
    let trimmed = llm_output.trim();
    if trimmed.is_empty() {
        warn!("[JsonUtils] Empty input for {} JSON parsing", description);
        return None;
    }

    // 1. Direct parse (fastest path)
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    // 2. Strip markdown code fences and retry
    let unfenced = strip_code_fences(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        debug!("[JsonUtils] Parsed {} after removing code fences", description);
        return Some(value);
    }

    // 3. Outermost object span
    if let Some(candidate) = outermost_span(unfenced, '{', '}') {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            warn!("[JsonUtils] Parsed {} by extracting outer braces", description);
            return Some(value);
        }
    }

    // 4. Outermost array span
    if let Some(candidate) = outermost_span(unfenced, '[', ']') {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            warn!("[JsonUtils] Parsed {} by extracting outer brackets", description);
            return Some(value);
        }
    }

    warn!(
        "[JsonUtils] All JSON parsing attempts failed for {} (first 120 chars: {:.120})",
        description, trimmed
    );
    None
}

fn strip_code_fences(text: &str) -> &str {
    let mut out = text;
    if out.starts_with("```json") {
        out = &out[7..];
    } else if out.starts_with("```") {
        out = &out[3..];
    }
    if out.trim_end().ends_with("```") {
        let end = out.trim_end().len() - 3;
        out = &out[..end];
    }
    out.trim()
}

fn outermost_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let parsed = parse_json_from_llm(r#"{"a": 1}"#, "test").unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn test_code_fence_stripping() {
        let raw = "```json\n{\"jupitor\": \"Jupiter\"}\n```";
        let parsed = parse_json_from_llm(raw, "test").unwrap();
        assert_eq!(parsed, json!({"jupitor": "Jupiter"}));

        let raw_plain_fence = "```\n[1, 2]\n```";
        let parsed = parse_json_from_llm(raw_plain_fence, "test").unwrap();
        assert_eq!(parsed, json!([1, 2]));
    }

    #[test]
    fn test_surrounding_commentary() {
        let raw = "Here are the corrections I found:\n{\"dow\": \"DAO\"}\nLet me know if you need more.";
        let parsed = parse_json_from_llm(raw, "test").unwrap();
        assert_eq!(parsed, json!({"dow": "DAO"}));
    }

    #[test]
    fn test_array_extraction() {
        let raw = "Topics: [\"governance\", \"launchpad\"] end";
        let parsed = parse_json_from_llm(raw, "test").unwrap();
        assert_eq!(parsed, json!(["governance", "launchpad"]));
    }

    #[test]
    fn test_unparsable_returns_none() {
        assert!(parse_json_from_llm("not json at all", "test").is_none());
        assert!(parse_json_from_llm("", "test").is_none());
        assert!(parse_json_from_llm("   ", "test").is_none());
        assert!(parse_json_from_llm("{broken: ", "test").is_none());
    }
}
