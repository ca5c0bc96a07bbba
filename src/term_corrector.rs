// src/term_corrector.rs
//
// Staged terminology correction over a transcript. Four linear stages:
//   A. apply stored high-confidence corrections
//   B. run the fuzzy analyzer on the partially-cleaned text
//   C. persist every finding, apply the fresh high-confidence ones
//   D. apply the stored medium-confidence backlog not already applied
// Any incorrect term is applied at most once per run. Every external
// failure (store, analyzer) degrades to "fewer corrections", never to an
// aborted run.

use log::{info, warn};
use std::collections::HashSet;

use crate::correction_applier::apply_corrections;
use crate::correction_store::{CorrectionStore, NewCorrection, SOURCE_LLM_IDENTIFIED};
use crate::reference_data::{PeopleCatalog, TermCatalog};
use crate::term_analyzer::TermAnalysis;

/// Confidence cutoffs gating immediate versus deferred application.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionThresholds {
    pub high: f64,
    pub medium: f64,
}

impl CorrectionThresholds {
    pub fn new(high: f64, medium: f64) -> CorrectionThresholds {
        CorrectionThresholds { high, medium }
    }
}

pub struct TermCorrector<A: TermAnalysis> {
    store: CorrectionStore,
    analyzer: A,
    terms: TermCatalog,
    people: PeopleCatalog,
    thresholds: CorrectionThresholds,
}

impl<A: TermAnalysis> TermCorrector<A> {
    pub fn new(
        store: CorrectionStore,
        analyzer: A,
        terms: TermCatalog,
        people: PeopleCatalog,
        thresholds: CorrectionThresholds,
    ) -> TermCorrector<A> {
        TermCorrector { store, analyzer, terms, people, thresholds }
    }

    /// Run the full four-stage correction sequence over a transcript.
    ///
    /// Deterministic given identical store state and analyzer output. An
    /// empty transcript short-circuits before any store or analyzer call.
    pub async fn correct_terms(&self, transcript: &str) -> String {
        if transcript.trim().is_empty() {
            return transcript.to_string();
        }

        // Stage A: apply the known high-confidence corrections
        let known = self.store.query(self.thresholds.high, None).await;
        info!("[TermCorrector] Stage A: {} known high-confidence corrections", known.len());
        let mut applied: HashSet<String> = known.iter().map(|(k, _)| k.to_lowercase()).collect();
        let stage_a = apply_corrections(transcript, &known);

        // Stage B: analyze the partially-cleaned text, if there is any
        // reference material to check against
        let findings = if self.terms.is_empty() && self.people.is_empty() {
            info!("[TermCorrector] Stage B skipped: both reference catalogs are empty");
            Default::default()
        } else {
            match self.analyzer.analyze(&stage_a, &self.terms, &self.people).await {
                Ok(findings) => {
                    info!("[TermCorrector] Stage B: analyzer returned {} findings", findings.len());
                    findings
                }
                Err(e) => {
                    warn!("[TermCorrector] Stage B degraded to no findings: {}", e);
                    Default::default()
                }
            }
        };

        // Stage C: persist everything the analyzer found, then apply the
        // fresh high-confidence findings that Stage A did not already cover.
        // Low-confidence findings are retained for future runs only.
        let mut corrected = stage_a;
        if !findings.is_empty() {
            let records: Vec<NewCorrection> = findings
                .iter()
                .map(|(incorrect, finding)| NewCorrection {
                    incorrect_term: incorrect.clone(),
                    correct_term: finding.term.clone(),
                    confidence: finding.confidence,
                    reasoning: finding.reasoning.clone(),
                    correction_type: finding.correction_type,
                    source: SOURCE_LLM_IDENTIFIED.to_string(),
                })
                .collect();
            self.store.upsert_many(&records).await;

            let fresh_high: Vec<(String, String)> = findings
                .iter()
                .filter(|(incorrect, finding)| {
                    finding.confidence >= self.thresholds.high
                        && !applied.contains(&incorrect.to_lowercase())
                })
                .map(|(incorrect, finding)| (incorrect.clone(), finding.term.clone()))
                .collect();
            if !fresh_high.is_empty() {
                info!("[TermCorrector] Stage C: applying {} new high-confidence findings", fresh_high.len());
                for (incorrect, _) in &fresh_high {
                    applied.insert(incorrect.to_lowercase());
                }
                corrected = apply_corrections(&corrected, &fresh_high);
            }
        }

        // Stage D: medium-confidence backlog from the store, minus every
        // key this run already applied
        let backlog: Vec<(String, String)> = self
            .store
            .query_detailed(self.thresholds.medium, None)
            .await
            .into_iter()
            .filter(|rec| rec.confidence < self.thresholds.high)
            .filter(|rec| !applied.contains(&rec.incorrect_term.to_lowercase()))
            .map(|rec| (rec.incorrect_term, rec.correct_term))
            .collect();
        if !backlog.is_empty() {
            info!("[TermCorrector] Stage D: applying {} medium-confidence corrections", backlog.len());
        }
        apply_corrections(&corrected, &backlog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction_store::{CorrectionType, SOURCE_MANUAL};
    use crate::term_analyzer::{AnalyzerError, TermFinding};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    struct StubAnalyzer {
        findings: HashMap<String, TermFinding>,
    }

    #[async_trait]
    impl TermAnalysis for StubAnalyzer {
        async fn analyze(
            &self,
            _transcript: &str,
            _terms: &TermCatalog,
            _people: &PeopleCatalog,
        ) -> Result<HashMap<String, TermFinding>, AnalyzerError> {
            Ok(self.findings.clone())
        }
    }

    struct FailingAnalyzer;

    #[async_trait]
    impl TermAnalysis for FailingAnalyzer {
        async fn analyze(
            &self,
            _transcript: &str,
            _terms: &TermCatalog,
            _people: &PeopleCatalog,
        ) -> Result<HashMap<String, TermFinding>, AnalyzerError> {
            Err(AnalyzerError::Unparsable)
        }
    }

    struct PanickingAnalyzer;

    #[async_trait]
    impl TermAnalysis for PanickingAnalyzer {
        async fn analyze(
            &self,
            _transcript: &str,
            _terms: &TermCatalog,
            _people: &PeopleCatalog,
        ) -> Result<HashMap<String, TermFinding>, AnalyzerError> {
            panic!("analyzer must not be invoked in this scenario");
        }
    }

    fn finding(term: &str, confidence: f64) -> TermFinding {
        TermFinding {
            term: term.to_string(),
            confidence,
            reasoning: None,
            correction_type: CorrectionType::Term,
        }
    }

    fn seed(incorrect: &str, correct: &str, confidence: f64) -> NewCorrection {
        NewCorrection {
            incorrect_term: incorrect.to_string(),
            correct_term: correct.to_string(),
            confidence,
            reasoning: None,
            correction_type: CorrectionType::Term,
            source: SOURCE_MANUAL.to_string(),
        }
    }

    fn sample_terms() -> TermCatalog {
        serde_json::from_value(json!({"terms": ["Jupiter", "JUP", "DAO", "Perps"]})).unwrap()
    }

    async fn temp_store() -> (CorrectionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CorrectionStore::connect(&dir.path().join("test.sqlite3")).await.unwrap();
        (store, dir)
    }

    fn thresholds() -> CorrectionThresholds {
        CorrectionThresholds::new(0.75, 0.6)
    }

    #[tokio::test]
    async fn test_threshold_staging_applies_high_and_medium() {
        let (store, _dir) = temp_store().await;
        store.upsert(&seed("jupe", "JUP", 0.9)).await.unwrap();
        store.upsert(&seed("perp", "Perps", 0.65)).await.unwrap();

        let corrector = TermCorrector::new(
            store,
            StubAnalyzer { findings: HashMap::new() },
            sample_terms(),
            PeopleCatalog::default(),
            thresholds(),
        );

        let result = corrector.correct_terms("the jupe and the perp markets").await;
        // High applied in Stage A, medium in Stage D; neither is dropped
        assert_eq!(result, "the JUP and the Perps markets");
    }

    #[tokio::test]
    async fn test_no_double_application_across_stages() {
        let (store, _dir) = temp_store().await;
        store.upsert(&seed("jupe", "JUP", 0.9)).await.unwrap();

        // The analyzer re-reports a Stage-A key at medium confidence with a
        // different replacement; Stage D must not re-apply it.
        let mut findings = HashMap::new();
        findings.insert("jupe".to_string(), finding("JUPITER", 0.65));

        let corrector = TermCorrector::new(
            store.clone(),
            StubAnalyzer { findings },
            sample_terms(),
            PeopleCatalog::default(),
            thresholds(),
        );

        let result = corrector.correct_terms("jupe rules").await;
        assert_eq!(result, "JUP rules");

        // The re-reported finding was still persisted for future runs
        let records = store.query_detailed(0.0, None).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].correct_term, "JUPITER");
        assert_eq!(records[0].confidence, 0.65);
    }

    #[tokio::test]
    async fn test_fresh_high_confidence_findings_applied_and_persisted() {
        let (store, _dir) = temp_store().await;

        let mut findings = HashMap::new();
        findings.insert("cat det".to_string(), finding("Catdet", 0.9));
        findings.insert("decca".to_string(), finding("DCA", 0.4)); // retained, not applied

        let corrector = TermCorrector::new(
            store.clone(),
            StubAnalyzer { findings },
            sample_terms(),
            PeopleCatalog::default(),
            thresholds(),
        );

        let result = corrector.correct_terms("every cat det uses decca daily").await;
        assert_eq!(result, "every Catdet uses decca daily");

        let records = store.query_detailed(0.0, None).await;
        assert_eq!(records.len(), 2);
        let low = records.iter().find(|r| r.incorrect_term == "decca").unwrap();
        assert_eq!(low.confidence, 0.4);
        assert_eq!(low.source, SOURCE_LLM_IDENTIFIED);
    }

    #[tokio::test]
    async fn test_analyzer_failure_degrades_to_stage_a_output() {
        let (store, _dir) = temp_store().await;
        store.upsert(&seed("jupyter", "Jupiter", 1.0)).await.unwrap();

        let corrector = TermCorrector::new(
            store,
            FailingAnalyzer,
            sample_terms(),
            PeopleCatalog::default(),
            thresholds(),
        );

        let result = corrector.correct_terms("jupyter is cool").await;
        assert_eq!(result, "Jupiter is cool");
    }

    #[tokio::test]
    async fn test_empty_transcript_short_circuits() {
        let (store, _dir) = temp_store().await;
        let corrector = TermCorrector::new(
            store,
            PanickingAnalyzer,
            sample_terms(),
            PeopleCatalog::default(),
            thresholds(),
        );
        assert_eq!(corrector.correct_terms("").await, "");
        assert_eq!(corrector.correct_terms("   ").await, "   ");
    }

    #[tokio::test]
    async fn test_empty_catalogs_skip_analyzer() {
        let (store, _dir) = temp_store().await;
        store.upsert(&seed("jupe", "JUP", 0.9)).await.unwrap();

        let corrector = TermCorrector::new(
            store,
            PanickingAnalyzer,
            TermCatalog::default(),
            PeopleCatalog::default(),
            thresholds(),
        );

        // Stored corrections still apply; the analyzer is never invoked
        assert_eq!(corrector.correct_terms("jupe season").await, "JUP season");
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let (store, _dir) = temp_store().await;
        store.upsert(&seed("jupyter", "Jupiter", 1.0)).await.unwrap();

        let mut findings = HashMap::new();
        findings.insert("the dow".to_string(), finding("the DAO", 0.95));

        let corrector = TermCorrector::new(
            store.clone(),
            StubAnalyzer { findings },
            sample_terms(),
            PeopleCatalog::default(),
            thresholds(),
        );

        let result = corrector.correct_terms("jupyter is cool, the dow voted yes").await;
        assert_eq!(result, "Jupiter is cool, the DAO voted yes");

        // The new finding is now part of the knowledge base
        let records = store.query_detailed(0.0, None).await;
        let dow = records.iter().find(|r| r.incorrect_term == "the dow").unwrap();
        assert_eq!(dow.correct_term, "the DAO");
        assert_eq!(dow.confidence, 0.95);
        assert_eq!(dow.source, SOURCE_LLM_IDENTIFIED);
    }
}
