// src/correction_applier.rs
//
// Applies an incorrect -> correct mapping to transcript text. Matching is
// case-insensitive and word-boundary safe; replacement always uses the
// stored canonical casing of the correct term. Longer incorrect keys are
// applied before shorter ones so that "perp dex" wins over "perp" when
// both cover the same span.

use log::{debug, warn};
use regex::{NoExpand, RegexBuilder};

/// Apply every correction rule to `text` and return the corrected copy.
///
/// The mapping is re-sorted by descending key length before application, so
/// callers do not have to guarantee ordering. Each rule replaces all of its
/// occurrences; a rule whose pattern fails to compile is skipped with a
/// warning. Re-applying a rule to already-corrected text is a no-op unless
/// the corrected form happens to be another rule's incorrect key.
pub fn apply_corrections(text: &str, mapping: &[(String, String)]) -> String {
    if text.is_empty() || mapping.is_empty() {
        return text.to_string();
    }

    let mut rules: Vec<&(String, String)> = mapping
        .iter()
        .filter(|(incorrect, _)| !incorrect.trim().is_empty())
        .collect();
    rules.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

    let mut corrected = text.to_string();
    let mut applied_count = 0usize;

    for (incorrect, correct) in rules {
        let pattern = boundary_pattern(incorrect);
        let regex = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => {
                warn!("[CorrectionApplier] Skipping unbuildable pattern for '{}': {}", incorrect, e);
                continue;
            }
        };

        if regex.is_match(&corrected) {
            // NoExpand: the replacement is literal text, never a capture reference
            corrected = regex.replace_all(&corrected, NoExpand(correct)).into_owned();
            applied_count += 1;
        }
    }

    if applied_count > 0 {
        debug!("[CorrectionApplier] Applied {} of {} rules", applied_count, mapping.len());
    }
    corrected
}

/// Build the match pattern for one incorrect term. `\b` anchors are only
/// valid next to word characters, so keys that start or end with
/// punctuation (e.g. "jupe-ai", "j. for j.") get anchored only on the
/// sides where a word character sits at the edge.
fn boundary_pattern(term: &str) -> String {
    let escaped = regex::escape(term);
    let starts_word = term.chars().next().map_or(false, is_word_char);
    let ends_word = term.chars().last().map_or(false, is_word_char);

    let mut pattern = String::with_capacity(escaped.len() + 4);
    if starts_word {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&escaped);
    if ends_word {
        pattern.push_str(r"\b");
    }
    pattern
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_longest_match_first() {
        // Shorter key listed first on purpose; the applier must still let
        // the longer phrase win over the overlapping span.
        let rules = mapping(&[("perp", "Perps"), ("perp dex", "Perps DEX")]);
        assert_eq!(apply_corrections("a perp dex exists", &rules), "a Perps DEX exists");
    }

    #[test]
    fn test_word_boundary_safety() {
        let rules = mapping(&[("perp", "Perps")]);
        assert_eq!(apply_corrections("perpendicular lines", &rules), "perpendicular lines");
        assert_eq!(apply_corrections("the perp market", &rules), "the Perps market");
    }

    #[test]
    fn test_canonical_casing_replacement() {
        let rules = mapping(&[("jupiter", "Jupiter")]);
        // Replacement always uses the stored casing, whatever was matched
        assert_eq!(apply_corrections("JUPITER", &rules), "Jupiter");
        assert_eq!(apply_corrections("Jupiter", &rules), "Jupiter");
        assert_eq!(apply_corrections("jupiter", &rules), "Jupiter");
        assert_eq!(apply_corrections("JuPiTeR rises", &rules), "Jupiter rises");
    }

    #[test]
    fn test_idempotent_per_rule() {
        let rules = mapping(&[("jupitor", "Jupiter")]);
        let once = apply_corrections("jupitor is bright", &rules);
        assert_eq!(once, "Jupiter is bright");
        assert_eq!(apply_corrections(&once, &rules), once);
    }

    #[test]
    fn test_punctuated_keys_match() {
        let rules = mapping(&[("jupe-ai", "JUP AI"), ("j. for j.", "J4J")]);
        assert_eq!(apply_corrections("the jupe-ai team", &rules), "the JUP AI team");
        assert_eq!(apply_corrections("vote j. for j. today", &rules), "vote J4J today");
    }

    #[test]
    fn test_replacement_is_literal() {
        // A correct term containing $ must not be treated as a capture group
        let rules = mapping(&[("one dollar", "$1")]);
        assert_eq!(apply_corrections("it costs one dollar now", &rules), "it costs $1 now");
    }

    #[test]
    fn test_multiple_occurrences() {
        let rules = mapping(&[("dow", "DAO")]);
        assert_eq!(
            apply_corrections("the dow met; the dow voted", &rules),
            "the DAO met; the DAO voted"
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(apply_corrections("", &mapping(&[("a", "b")])), "");
        assert_eq!(apply_corrections("text", &[]), "text");
        // Blank keys are ignored rather than matching everywhere
        assert_eq!(apply_corrections("text", &mapping(&[("", "x"), (" ", "y")])), "text");
    }

    #[test]
    fn test_phrase_with_adjacent_punctuation() {
        let rules = mapping(&[("the dow", "the DAO")]);
        assert_eq!(apply_corrections("so, the dow, voted.", &rules), "so, the DAO, voted.");
    }
}
