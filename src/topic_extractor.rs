// src/topic_extractor.rs
//
// LLM-driven extraction of the main topics discussed in a transcript.
// Topics arrive from the model either as bare strings or as rich objects;
// the shape is resolved once at the parse boundary into the Topic enum
// and never re-sniffed downstream.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json_utils::parse_json_from_llm;
use crate::llm_client::{GenerationOptions, LlmClient};

const MAX_TOPICS: usize = 10;

fn default_topic_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Default for Relevance {
    fn default() -> Self {
        Relevance::Medium
    }
}

/// A topic as reported by the model: either a plain label or a rich
/// object with supporting metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Topic {
    Simple(String),
    Rich(RichTopic),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RichTopic {
    pub topic: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub relevance: Relevance,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_topic_confidence")]
    pub confidence: f64,
}

impl Topic {
    pub fn label(&self) -> &str {
        match self {
            Topic::Simple(label) => label,
            Topic::Rich(rich) => &rich.topic,
        }
    }
}

/// Identify the key topics in a transcript. Failures (service errors,
/// unparsable output) yield an empty list; topic extraction is an
/// enrichment step, never a reason to abort the pipeline.
pub async fn extract_topics(client: &LlmClient, transcript: &str, content_type: Option<&str>) -> Vec<Topic> {
    if transcript.trim().is_empty() {
        warn!("[TopicExtractor] Transcript is empty, skipping topic extraction");
        return Vec::new();
    }

    let prompt = build_topic_prompt(transcript, content_type);
    let options = GenerationOptions {
        temperature: Some(0.3),
        max_output_tokens: Some(2048),
        system_instruction: Some(
            "You identify the key topics discussed in broadcast transcripts and return a \
             structured list of the most relevant subjects with supporting information. \
             Output must be a valid JSON array of topic objects."
                .to_string(),
        ),
    };

    let raw = match client.generate(&prompt, &options).await {
        Ok(text) => text,
        Err(e) => {
            warn!("[TopicExtractor] Topic extraction failed: {}", e);
            return Vec::new();
        }
    };

    let topics = match parse_json_from_llm(&raw, "topic extraction") {
        Some(value) => parse_topics(value),
        None => Vec::new(),
    };

    info!("[TopicExtractor] Extracted {} topics", topics.len());
    topics
}

/// Resolve the raw model output into typed topics, skipping entries that
/// fit neither shape.
fn parse_topics(value: Value) -> Vec<Topic> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            warn!("[TopicExtractor] Expected a JSON array of topics, got {}", type_name(&other));
            return Vec::new();
        }
    };

    let mut topics = Vec::new();
    for item in items {
        match serde_json::from_value::<Topic>(item.clone()) {
            Ok(topic) => {
                if topic.label().trim().is_empty() {
                    warn!("[TopicExtractor] Skipping topic with empty label");
                    continue;
                }
                topics.push(topic);
            }
            Err(e) => {
                warn!("[TopicExtractor] Skipping malformed topic entry: {} ({:.80})", e, item.to_string());
            }
        }
    }
    topics
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render topics for inclusion in the summary prompt. Rich topics below
/// medium relevance or under the confidence floor are left out.
pub fn format_topics(topics: &[Topic]) -> String {
    if topics.is_empty() {
        return "No specific topics extracted".to_string();
    }

    let mut formatted = String::from("**Key Topics:**\n");
    for topic in topics {
        match topic {
            Topic::Simple(label) => {
                formatted.push_str(&format!("- {}\n", label));
            }
            Topic::Rich(rich) => {
                if rich.relevance == Relevance::Low || rich.confidence < 0.7 {
                    continue;
                }
                formatted.push_str(&format!("\n### {}\n", rich.topic));
                if !rich.key_points.is_empty() {
                    formatted.push_str("Key points:\n");
                    for point in &rich.key_points {
                        formatted.push_str(&format!("- {}\n", point));
                    }
                }
                if let Some(category) = &rich.category {
                    formatted.push_str(&format!("Category: {}\n", category));
                }
            }
        }
    }
    formatted
}

fn build_topic_prompt(transcript: &str, content_type: Option<&str>) -> String {
    let mut prompt = format!(
        "Analyze the following broadcast transcript and identify the main topics discussed.\n\n\
         **Transcript:**\n```\n{}\n```\n\n\
         **Instructions:**\n\
         1. Identify the most important topics: specific subjects, projects, announcements or discussions.\n\
         2. For each topic provide a concise label (1-5 words), 1-3 key points, a relevance \
         rating (high, medium, low), a category, and a confidence score (0.0-1.0).\n\
         3. Return ONLY a valid JSON array of objects like:\n\
         ```json\n\
         [\n\
           {{\n\
             \"topic\": \"Launchpad Updates\",\n\
             \"key_points\": [\"Three new projects were voted in\"],\n\
             \"relevance\": \"high\",\n\
             \"category\": \"Governance\",\n\
             \"confidence\": 0.95\n\
           }}\n\
         ]\n\
         ```\n\
         4. Aim for approximately {} topics, adjusted to the content's density.\n\
         5. If the transcript lacks clear topics, return an empty JSON array.\n",
        transcript, MAX_TOPICS
    );

    if let Some(content_type) = content_type {
        prompt.push_str(&format!(
            "\n**Content Format:**\nThis transcript is a \"{}\" recording; weight recurring \
             segments of that format accordingly.\n",
            content_type
        ));
    }

    prompt.push_str("\n**JSON Response:**\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_shapes() {
        let topics = parse_topics(json!([
            "governance",
            {"topic": "LFG Launchpad", "key_points": ["two projects"], "relevance": "high", "confidence": 0.9}
        ]));
        assert_eq!(topics.len(), 2);
        assert!(matches!(&topics[0], Topic::Simple(s) if s == "governance"));
        match &topics[1] {
            Topic::Rich(rich) => {
                assert_eq!(rich.topic, "LFG Launchpad");
                assert_eq!(rich.relevance, Relevance::High);
            }
            _ => panic!("expected rich topic"),
        }
    }

    #[test]
    fn test_parse_applies_defaults() {
        let topics = parse_topics(json!([{"topic": "Perps volume"}]));
        match &topics[0] {
            Topic::Rich(rich) => {
                assert_eq!(rich.relevance, Relevance::Medium);
                assert_eq!(rich.confidence, 0.7);
                assert!(rich.key_points.is_empty());
                assert!(rich.category.is_none());
            }
            _ => panic!("expected rich topic"),
        }
    }

    #[test]
    fn test_parse_skips_malformed_entries() {
        let topics = parse_topics(json!([
            {"no_topic_field": true},
            42,
            {"topic": "   "},
            {"topic": "kept"}
        ]));
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].label(), "kept");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_topics(json!({"topic": "not a list"})).is_empty());
    }

    #[test]
    fn test_format_topics_filters_weak_entries() {
        let topics = parse_topics(json!([
            {"topic": "Big News", "relevance": "high", "confidence": 0.9, "key_points": ["shipped"], "category": "Product"},
            {"topic": "Side Note", "relevance": "low"},
            {"topic": "Shaky Guess", "confidence": 0.4},
            "plain label"
        ]));
        let formatted = format_topics(&topics);
        assert!(formatted.contains("### Big News"));
        assert!(formatted.contains("- shipped"));
        assert!(formatted.contains("Category: Product"));
        assert!(formatted.contains("- plain label"));
        assert!(!formatted.contains("Side Note"));
        assert!(!formatted.contains("Shaky Guess"));
    }

    #[test]
    fn test_format_topics_empty() {
        assert_eq!(format_topics(&[]), "No specific topics extracted");
    }
}
