// src/summarizer.rs
//
// Prompt template handling and the final summary generation call.

use log::{info, warn};
use std::path::Path;

use crate::file_utils::read_file;
use crate::llm_client::{GenerationOptions, LlmClient, LlmError};
use crate::reference_data::{PeopleCatalog, TermCatalog};
use crate::topic_extractor::{format_topics, Topic};

/// Cap on how many term entries ride along in the summary prompt; people
/// entries are always included in full.
const MAX_CONTEXT_TERMS: usize = 35;

const DEFAULT_TEMPLATE: &str = "\
Summarize the following broadcast transcript into a clear, well-structured \
Markdown document. Open with a short overview paragraph, then cover the key \
announcements, decisions and discussions in sections. Close with action items \
if any were mentioned.

{CONTEXT}

{TOPICS}

Transcript:
{TRANSCRIPT}
";

/// Load a prompt template by type from the prompts directory, falling back
/// to the built-in default when the file is missing.
pub fn get_prompt_template(prompts_dir: &Path, template_type: &str) -> String {
    let path = prompts_dir.join(format!("{}.txt", template_type));
    match read_file(&path) {
        Ok(template) => {
            info!("[Summarizer] Loaded '{}' template from {}", template_type, path.display());
            template
        }
        Err(e) => {
            warn!("[Summarizer] {}. Using built-in default template.", e);
            DEFAULT_TEMPLATE.to_string()
        }
    }
}

/// Fill a template's {TRANSCRIPT}, {TOPICS} and {CONTEXT} placeholders.
/// A template without a {TRANSCRIPT} placeholder gets the transcript
/// appended so the model always sees it.
pub fn prepare_summary_prompt(
    template: &str,
    transcript: &str,
    topics: &[Topic],
    terms: &TermCatalog,
    people: &PeopleCatalog,
) -> String {
    let topics_formatted = format_topics(topics);
    let context = build_reference_context(terms, people);

    if template.contains("{TRANSCRIPT}") {
        template
            .replace("{TRANSCRIPT}", transcript)
            .replace("{TOPICS}", &topics_formatted)
            .replace("{CONTEXT}", &context)
    } else {
        format!("{}\n\n{}\n\n{}\n\nTranscript:\n{}", template, context, topics_formatted, transcript)
    }
}

fn build_reference_context(terms: &TermCatalog, people: &PeopleCatalog) -> String {
    // Keep the prompt bounded: only the most important terms make it in
    let mut trimmed_terms = terms.clone();
    if trimmed_terms.terms.len() > MAX_CONTEXT_TERMS {
        trimmed_terms.terms.truncate(MAX_CONTEXT_TERMS);
    }
    format!("{}\n\n{}", trimmed_terms.format_for_prompt(), people.format_for_prompt())
}

/// Generate the final summary. This is the one place in the pipeline where
/// a service failure is fatal to the run; without a summary there is no
/// deliverable.
pub async fn generate_summary(
    client: &LlmClient,
    transcript: &str,
    template: &str,
    topics: &[Topic],
    terms: &TermCatalog,
    people: &PeopleCatalog,
) -> Result<String, LlmError> {
    let prompt = prepare_summary_prompt(template, transcript, topics, terms, people);

    let options = GenerationOptions {
        temperature: Some(0.7),
        max_output_tokens: Some(8192),
        system_instruction: Some(
            "You are an expert summarizer of broadcast and community-call transcripts. Create \
             clear, concise, engaging summaries. Be extremely precise with domain terminology \
             and people names: if a name or term appears in the provided reference context, \
             always use that exact spelling and capitalization. Focus on key decisions, \
             announcements, technical details, community sentiment and action items. Use \
             Markdown formatting for readability."
                .to_string(),
        ),
    };

    info!("[Summarizer] Sending summarization request");
    let raw = client.generate(&prompt, &options).await?;
    Ok(clean_summary_markdown(&raw))
}

/// Strip a wrapping markdown code fence from model output so the saved
/// file is plain Markdown.
fn clean_summary_markdown(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut body = trimmed;
    if body.starts_with("```markdown") {
        body = &body[11..];
    } else if body.starts_with("```md") {
        body = &body[5..];
    } else if body.starts_with("```") {
        body = &body[3..];
    } else {
        return trimmed.to_string();
    }
    if body.trim_end().ends_with("```") {
        let end = body.trim_end().len() - 3;
        body = &body[..end];
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_substitution() {
        let template = "Intro\n{CONTEXT}\n{TOPICS}\nBody:\n{TRANSCRIPT}";
        let prompt = prepare_summary_prompt(
            template,
            "the transcript body",
            &[],
            &TermCatalog::default(),
            &PeopleCatalog::default(),
        );
        assert!(prompt.contains("the transcript body"));
        assert!(prompt.contains("No specific topics extracted"));
        assert!(prompt.contains("No term data available."));
        assert!(!prompt.contains("{TRANSCRIPT}"));
        assert!(!prompt.contains("{TOPICS}"));
        assert!(!prompt.contains("{CONTEXT}"));
    }

    #[test]
    fn test_template_without_transcript_placeholder() {
        let prompt = prepare_summary_prompt(
            "Summarize this recording.",
            "the transcript body",
            &[],
            &TermCatalog::default(),
            &PeopleCatalog::default(),
        );
        assert!(prompt.contains("Summarize this recording."));
        assert!(prompt.contains("Transcript:\nthe transcript body"));
    }

    #[test]
    fn test_missing_template_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let template = get_prompt_template(dir.path(), "office_hours");
        assert_eq!(template, DEFAULT_TEMPLATE);

        std::fs::write(dir.path().join("office_hours.txt"), "custom {TRANSCRIPT}").unwrap();
        let template = get_prompt_template(dir.path(), "office_hours");
        assert_eq!(template, "custom {TRANSCRIPT}");
    }

    #[test]
    fn test_clean_summary_markdown() {
        assert_eq!(clean_summary_markdown("# Title\nbody"), "# Title\nbody");
        assert_eq!(clean_summary_markdown("```markdown\n# Title\nbody\n```"), "# Title\nbody");
        assert_eq!(clean_summary_markdown("```\n# Title\n```"), "# Title");
        assert_eq!(clean_summary_markdown("  # Title  "), "# Title");
    }
}
