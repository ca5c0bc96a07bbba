// src/transcription.rs
//
// Speech-to-text over HTTP: the audio file is uploaded to a Whisper-style
// endpoint and the transcript text comes back as JSON. Oversized audio is
// split into time segments with ffmpeg first and the segment transcripts
// joined in order.

use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::TranscriptionSettings;

/// Cap on vocabulary terms passed along as a recognition hint.
const MAX_VOCABULARY_TERMS: usize = 30;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("could not read audio file {0}: {1}")]
    ReadAudio(PathBuf, std::io::Error),
    #[error("transcription request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("could not launch ffmpeg/ffprobe (is it installed?): {0}")]
    Spawn(std::io::Error),
    #[error("audio splitting failed: {0}")]
    SplitFailed(String),
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct TranscriptionClient {
    http: reqwest::Client,
    settings: TranscriptionSettings,
    api_key: Option<String>,
}

impl TranscriptionClient {
    pub fn new(
        settings: TranscriptionSettings,
        api_key: Option<String>,
    ) -> Result<TranscriptionClient, TranscribeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(TranscribeError::ClientBuild)?;
        Ok(TranscriptionClient { http, settings, api_key })
    }

    /// Transcribe an audio file, splitting it first when it exceeds the
    /// configured size limit. `vocabulary` carries known domain terms and
    /// names as a recognition hint; the list is capped before sending.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        vocabulary: &[String],
    ) -> Result<String, TranscribeError> {
        let size = std::fs::metadata(audio_path)
            .map_err(|e| TranscribeError::ReadAudio(audio_path.to_path_buf(), e))?
            .len();
        let max_bytes = self.settings.max_audio_mb * 1024 * 1024;
        let vocabulary_hint = build_vocabulary_hint(vocabulary);

        if size <= max_bytes {
            info!(
                "[Transcription] Audio is {:.1}MB, transcribing in one request",
                size as f64 / (1024.0 * 1024.0)
            );
            return self.transcribe_chunk_with_retry(audio_path, vocabulary_hint.as_deref()).await;
        }

        info!(
            "[Transcription] Audio is {:.1}MB (limit {}MB), splitting into segments",
            size as f64 / (1024.0 * 1024.0),
            self.settings.max_audio_mb
        );
        let split_dir = tempfile::tempdir().map_err(|e| TranscribeError::SplitFailed(e.to_string()))?;
        let chunks = split_audio(audio_path, split_dir.path(), size, max_bytes).await?;

        let mut parts = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            info!("[Transcription] Transcribing segment {}/{}", i + 1, chunks.len());
            parts.push(self.transcribe_chunk_with_retry(chunk, vocabulary_hint.as_deref()).await?);
        }
        Ok(parts.join("\n"))
    }

    async fn transcribe_chunk_with_retry(
        &self,
        path: &Path,
        vocabulary_hint: Option<&str>,
    ) -> Result<String, TranscribeError> {
        let mut last_error = String::new();
        for attempt in 1..=self.settings.max_attempts {
            if attempt > 1 {
                let delay = Duration::from_secs(2 * attempt as u64);
                warn!(
                    "[Transcription] Attempt {} failed ({}), retrying in {}s",
                    attempt - 1,
                    last_error,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
            match self.transcribe_chunk(path, vocabulary_hint).await {
                Ok(text) => return Ok(text),
                Err(e) => last_error = e,
            }
        }
        Err(TranscribeError::RetriesExhausted {
            attempts: self.settings.max_attempts,
            last_error,
        })
    }

    async fn transcribe_chunk(&self, path: &Path, vocabulary_hint: Option<&str>) -> Result<String, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("could not read {}: {}", path.display(), e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| format!("invalid mime type: {}", e))?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(hint) = vocabulary_hint {
            form = form.text("prompt", hint.to_string());
        }

        let mut request = self.http.post(&self.settings.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| format!("network error: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {:.200}", status, body));
        }

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| format!("malformed response: {}", e))?;
        Ok(parsed.text)
    }
}

/// Join vocabulary terms into the hint string sent with each request.
/// None when there is nothing to hint with.
fn build_vocabulary_hint(vocabulary: &[String]) -> Option<String> {
    if vocabulary.is_empty() {
        return None;
    }
    let capped: Vec<&str> = vocabulary
        .iter()
        .take(MAX_VOCABULARY_TERMS)
        .map(|s| s.as_str())
        .collect();
    Some(capped.join(", "))
}

/// Split the audio into roughly size-bounded segments using ffmpeg's
/// segment muxer. Segment length is the total duration scaled by the
/// allowed size fraction.
async fn split_audio(
    audio_path: &Path,
    out_dir: &Path,
    total_bytes: u64,
    max_bytes: u64,
) -> Result<Vec<PathBuf>, TranscribeError> {
    let duration = probe_duration_secs(audio_path).await?;
    let segment_secs = compute_segment_seconds(total_bytes, max_bytes, duration);

    let pattern = out_dir.join("segment_%03d.mp3");
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-i")
        .arg(audio_path)
        .arg("-f")
        .arg("segment")
        .arg("-segment_time")
        .arg(segment_secs.to_string())
        .arg("-c")
        .arg("copy")
        .arg(&pattern)
        .output()
        .await
        .map_err(TranscribeError::Spawn)?;

    if !output.status.success() {
        return Err(TranscribeError::SplitFailed(
            String::from_utf8_lossy(&output.stderr).chars().take(500).collect(),
        ));
    }

    let mut chunks: Vec<PathBuf> = std::fs::read_dir(out_dir)
        .map_err(|e| TranscribeError::SplitFailed(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with("segment_"))
                .unwrap_or(false)
        })
        .collect();
    chunks.sort();

    if chunks.is_empty() {
        return Err(TranscribeError::SplitFailed("ffmpeg produced no segments".to_string()));
    }
    info!("[Transcription] Split audio into {} segments of ~{}s", chunks.len(), segment_secs);
    Ok(chunks)
}

async fn probe_duration_secs(audio_path: &Path) -> Result<f64, TranscribeError> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=duration")
        .arg("-of")
        .arg("csv=p=0")
        .arg(audio_path)
        .output()
        .await
        .map_err(TranscribeError::Spawn)?;

    if !output.status.success() {
        return Err(TranscribeError::SplitFailed("ffprobe could not read duration".to_string()));
    }
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| TranscribeError::SplitFailed(format!("unparsable duration: {}", e)))
}

/// Scale the total duration by the allowed size fraction, with a floor so
/// pathological inputs cannot produce second-long segment storms.
fn compute_segment_seconds(total_bytes: u64, max_bytes: u64, duration_secs: f64) -> u64 {
    let fraction = max_bytes as f64 / total_bytes.max(1) as f64;
    let secs = (duration_secs * fraction).floor() as u64;
    secs.max(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_segment_seconds() {
        // 100MB file with a 50MB limit over an hour: half-hour segments
        assert_eq!(
            compute_segment_seconds(100 * 1024 * 1024, 50 * 1024 * 1024, 3600.0),
            1800
        );
        // The floor keeps segments from degenerating
        assert_eq!(compute_segment_seconds(1000, 1, 10.0), 60);
    }

    #[test]
    fn test_vocabulary_hint() {
        assert_eq!(build_vocabulary_hint(&[]), None);
        let terms = vec!["JUP".to_string(), "Jupiverse".to_string()];
        assert_eq!(build_vocabulary_hint(&terms).unwrap(), "JUP, Jupiverse");

        let many: Vec<String> = (0..100).map(|i| format!("term{}", i)).collect();
        let hint = build_vocabulary_hint(&many).unwrap();
        assert_eq!(hint.matches(", ").count(), MAX_VOCABULARY_TERMS - 1);
    }

    #[test]
    fn test_response_deserialization() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "hello world", "chunks": []}"#).unwrap();
        assert_eq!(parsed.text, "hello world");
    }
}
