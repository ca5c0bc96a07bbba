// src/term_analyzer.rs
//
// LLM-backed fuzzy analysis of transcript terminology. Sends the reference
// catalogs plus the transcript to the generative service and parses back a
// mapping of suspected incorrect terms to suggested corrections. Model
// output is advisory: confidence and type feed the orchestrator's
// threshold policy, they are never trusted as final decisions.

use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::correction_store::CorrectionType;
use crate::json_utils::parse_json_from_llm;
use crate::llm_client::{GenerationOptions, LlmClient, LlmError};
use crate::reference_data::{PeopleCatalog, TermCatalog};

/// Default confidence when the model omits one.
const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analysis service unavailable: {0}")]
    Service(#[from] LlmError),
    #[error("analysis response was not parsable as a JSON object")]
    Unparsable,
}

/// A single correction candidate for this run. Not trusted until persisted
/// and thresholded by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TermFinding {
    pub term: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub correction_type: CorrectionType,
}

/// Seam for the orchestrator: anything that can turn a transcript plus
/// catalogs into findings. Production uses [`TermAnalyzer`]; tests stub it.
#[async_trait]
pub trait TermAnalysis: Send + Sync {
    async fn analyze(
        &self,
        transcript: &str,
        terms: &TermCatalog,
        people: &PeopleCatalog,
    ) -> Result<HashMap<String, TermFinding>, AnalyzerError>;
}

pub struct TermAnalyzer {
    client: Arc<LlmClient>,
    /// Character cap on the transcript excerpt embedded in the prompt.
    transcript_limit: usize,
}

impl TermAnalyzer {
    pub fn new(client: Arc<LlmClient>, transcript_limit: usize) -> TermAnalyzer {
        TermAnalyzer { client, transcript_limit }
    }
}

#[async_trait]
impl TermAnalysis for TermAnalyzer {
    async fn analyze(
        &self,
        transcript: &str,
        terms: &TermCatalog,
        people: &PeopleCatalog,
    ) -> Result<HashMap<String, TermFinding>, AnalyzerError> {
        if transcript.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let excerpt = truncate_chars(transcript, self.transcript_limit);
        let prompt = build_analysis_prompt(excerpt, terms, people);

        let options = GenerationOptions {
            // Classification-style task: keep generation deterministic-leaning
            temperature: Some(0.1),
            max_output_tokens: Some(2048),
            system_instruction: Some(
                "You are a specialized assistant that reconciles noisy speech-to-text output \
                 against a reference list of domain terminology and people names. You respond \
                 with JSON only, no commentary."
                    .to_string(),
            ),
        };

        let raw = self.client.generate(&prompt, &options).await?;

        let value = parse_json_from_llm(&raw, "term analysis").ok_or(AnalyzerError::Unparsable)?;
        let object = value.as_object().ok_or(AnalyzerError::Unparsable)?;

        let findings = validate_findings(object, people);
        info!("[TermAnalyzer] Model proposed {} usable corrections", findings.len());
        Ok(findings)
    }
}

fn build_analysis_prompt(transcript_excerpt: &str, terms: &TermCatalog, people: &PeopleCatalog) -> String {
    format!(
        "Analyze the following transcript from a recorded broadcast and identify misspellings \
         or incorrect usages of the domain terminology and people names listed in the reference \
         sections. Speech-to-text output frequently mangles these; look for variations that are \
         consistently wrong throughout the transcript. Focus only on terminology and names from \
         the reference sections.\n\n\
         {terms_block}\n\n\
         {people_block}\n\n\
         TRANSCRIPT:\n{transcript}\n\n\
         Output ONLY a JSON object. Each key must be the incorrect text exactly as it appears in \
         the transcript. Each value must be an object with these fields:\n\
         - \"term\": the corrected form\n\
         - \"confidence\": number between 0.0 and 1.0\n\
         - \"reasoning\": short explanation\n\
         - \"correction_type\": one of \"term\", \"person\", \"acronym\"\n\n\
         Example:\n\
         {{\n\
           \"jupitor\": {{\"term\": \"Jupiter\", \"confidence\": 0.95, \"reasoning\": \"common mishearing\", \"correction_type\": \"term\"}},\n\
           \"the dow\": {{\"term\": \"the DAO\", \"confidence\": 0.9, \"reasoning\": \"DAO misheard as dow\", \"correction_type\": \"term\"}}\n\
         }}\n\n\
         Include only terms that actually appear incorrectly in the transcript. Do not map \
         correct terms to themselves. Return an empty JSON object if nothing needs correcting.",
        terms_block = terms.format_for_prompt(),
        people_block = people.format_for_prompt(),
        transcript = transcript_excerpt,
    )
}

/// Validate the raw model output entry by entry. Entries without a usable
/// "term" field are discarded; a missing confidence defaults to 0.7 and is
/// clamped into [0, 1]; the correction type falls back to person-or-term
/// inference against the people catalog when the model's tag is absent or
/// unknown.
fn validate_findings(
    object: &serde_json::Map<String, Value>,
    people: &PeopleCatalog,
) -> HashMap<String, TermFinding> {
    let mut findings = HashMap::new();

    for (incorrect, entry) in object {
        if incorrect.trim().is_empty() {
            continue;
        }

        let entry = match entry.as_object() {
            Some(map) => map,
            None => {
                warn!("[TermAnalyzer] Discarding non-object entry for '{}'", incorrect);
                continue;
            }
        };

        let term = match entry.get("term").and_then(Value::as_str) {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => {
                warn!("[TermAnalyzer] Discarding entry for '{}' with no term field", incorrect);
                continue;
            }
        };

        let confidence = entry
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);

        let reasoning = entry
            .get("reasoning")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let correction_type = entry
            .get("correction_type")
            .and_then(Value::as_str)
            .and_then(CorrectionType::parse)
            .unwrap_or_else(|| {
                if people.is_known_name(&term) {
                    CorrectionType::Person
                } else {
                    CorrectionType::Term
                }
            });

        findings.insert(
            incorrect.clone(),
            TermFinding { term, confidence, reasoning, correction_type },
        );
    }

    findings
}

/// Truncate on a char boundary so multibyte transcripts cannot split a
/// code point mid-sequence.
fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn people_with(names: &[&str]) -> PeopleCatalog {
        serde_json::from_value(json!({ "people": names })).unwrap()
    }

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_validate_full_entry() {
        let raw = as_map(json!({
            "jupitor": {
                "term": "Jupiter",
                "confidence": 0.95,
                "reasoning": "common mishearing",
                "correction_type": "term"
            }
        }));
        let findings = validate_findings(&raw, &PeopleCatalog::default());
        let finding = &findings["jupitor"];
        assert_eq!(finding.term, "Jupiter");
        assert_eq!(finding.confidence, 0.95);
        assert_eq!(finding.reasoning.as_deref(), Some("common mishearing"));
        assert_eq!(finding.correction_type, CorrectionType::Term);
    }

    #[test]
    fn test_missing_term_discarded() {
        let raw = as_map(json!({
            "bad entry": {"confidence": 0.9},
            "also bad": "just a string",
            "empty term": {"term": "   "},
            "good": {"term": "Good"}
        }));
        let findings = validate_findings(&raw, &PeopleCatalog::default());
        assert_eq!(findings.len(), 1);
        assert!(findings.contains_key("good"));
    }

    #[test]
    fn test_default_confidence_and_clamping() {
        let raw = as_map(json!({
            "a": {"term": "A"},
            "b": {"term": "B", "confidence": 1.7},
            "c": {"term": "C", "confidence": -0.2}
        }));
        let findings = validate_findings(&raw, &PeopleCatalog::default());
        assert_eq!(findings["a"].confidence, 0.7);
        assert_eq!(findings["b"].confidence, 1.0);
        assert_eq!(findings["c"].confidence, 0.0);
    }

    #[test]
    fn test_person_inference_from_catalog() {
        let people = people_with(&["Meow"]);
        let raw = as_map(json!({
            "mia": {"term": "Meow"},
            "jupe": {"term": "JUP"},
            "tagged": {"term": "Meow", "correction_type": "acronym"}
        }));
        let findings = validate_findings(&raw, &people);
        assert_eq!(findings["mia"].correction_type, CorrectionType::Person);
        assert_eq!(findings["jupe"].correction_type, CorrectionType::Term);
        // An explicit valid tag from the model wins over inference
        assert_eq!(findings["tagged"].correction_type, CorrectionType::Acronym);
    }

    #[test]
    fn test_unknown_type_tag_falls_back() {
        let raw = as_map(json!({
            "x": {"term": "X", "correction_type": "banana"}
        }));
        let findings = validate_findings(&raw, &PeopleCatalog::default());
        assert_eq!(findings["x"].correction_type, CorrectionType::Term);
    }

    #[test]
    fn test_prompt_embeds_catalogs_and_transcript() {
        let terms: TermCatalog =
            serde_json::from_value(json!({"terms": ["Jupiverse"]})).unwrap();
        let people = people_with(&["Meow"]);
        let prompt = build_analysis_prompt("the jupyverse is growing", &terms, &people);
        assert!(prompt.contains("Jupiverse"));
        assert!(prompt.contains("Meow"));
        assert!(prompt.contains("the jupyverse is growing"));
        assert!(prompt.contains("correction_type"));
    }

    #[test]
    fn test_truncate_chars_is_boundary_safe() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 4), "héll");
        assert_eq!(truncate_chars(text, 100), text);
        assert_eq!(truncate_chars("", 10), "");
    }
}
