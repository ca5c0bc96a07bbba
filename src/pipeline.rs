// src/pipeline.rs
//
// The end-to-end broadcast processing sequence: download, transcribe,
// clean, correct terminology, extract topics, summarize, write outputs.

use chrono::Utc;
use log::{info, warn};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::Settings;
use crate::downloader::{download_audio, DownloadError};
use crate::file_utils::{output_path, sanitize_filename, save_to_file};
use crate::llm_client::{LlmClient, LlmError};
use crate::reference_data::{PeopleCatalog, TermCatalog};
use crate::summarizer::{generate_summary, get_prompt_template};
use crate::term_analyzer::TermAnalyzer;
use crate::term_corrector::TermCorrector;
use crate::topic_extractor::extract_topics;
use crate::transcript_cleaner::clean_transcript;
use crate::transcription::{TranscribeError, TranscriptionClient};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("transcription failed: {0}")]
    Transcribe(#[from] TranscribeError),
    #[error("summary generation failed: {0}")]
    Summary(#[from] LlmError),
    #[error("{0}")]
    Output(String),
}

/// Process one broadcast URL through the whole pipeline and return the
/// path of the generated summary.
pub async fn process_broadcast(
    settings: &Settings,
    corrector: &TermCorrector<TermAnalyzer>,
    llm: &LlmClient,
    transcriber: &TranscriptionClient,
    terms: &TermCatalog,
    people: &PeopleCatalog,
    url: &str,
    template_type: &str,
) -> Result<PathBuf, PipelineError> {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let work_dir = settings.temp_dir().join(format!("run_{}", timestamp));

    // Downloaded audio is scratch data; remove it on every exit path
    let cleanup_dir = work_dir.clone();
    let _cleanup = scopeguard::guard((), move |_| {
        if cleanup_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&cleanup_dir) {
                warn!("[Pipeline] Failed to clean up {}: {}", cleanup_dir.display(), e);
            }
        }
    });

    info!("[Pipeline] Downloading audio from {}", url);
    let audio = download_audio(url, &work_dir).await?;
    let stem = format!("{}_{}", timestamp, sanitize_filename(&audio.title));

    // Known terms and names double as a recognition hint for the
    // transcription service
    let mut vocabulary = terms.flatten();
    vocabulary.extend(people.flatten());

    info!("[Pipeline] Transcribing audio...");
    let transcript = transcriber.transcribe(&audio.path, &vocabulary).await?;
    if transcript.trim().is_empty() {
        warn!("[Pipeline] Transcription produced no text");
    }

    let output_dir = settings.output_dir();
    let raw_path = output_path(&output_dir, &stem, "transcript_raw", "txt");
    save_to_file(&transcript, &raw_path).map_err(PipelineError::Output)?;
    info!("[Pipeline] Raw transcript saved to {}", raw_path.display());

    info!("[Pipeline] Cleaning and correcting transcript...");
    let cleaned = clean_transcript(&transcript);
    let corrected = corrector.correct_terms(&cleaned).await;

    let topics = extract_topics(llm, &corrected, Some(template_type)).await;
    if !topics.is_empty() {
        let labels: Vec<&str> = topics.iter().map(|t| t.label()).collect();
        info!("[Pipeline] Extracted topics: {}", labels.join(", "));
    }

    let processed_path = output_path(&output_dir, &stem, "transcript_processed", "txt");
    save_to_file(&corrected, &processed_path).map_err(PipelineError::Output)?;
    info!("[Pipeline] Processed transcript saved to {}", processed_path.display());

    let template = get_prompt_template(&settings.prompts_dir(), template_type);
    info!("[Pipeline] Generating summary...");
    let summary = generate_summary(llm, &corrected, &template, &topics, terms, people).await?;

    let summary_path = output_path(&output_dir, &stem, "summary", "md");
    save_to_file(&summary, &summary_path).map_err(PipelineError::Output)?;
    info!("[Pipeline] Summary saved to {}", summary_path.display());

    Ok(summary_path)
}
