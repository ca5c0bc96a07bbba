// src/downloader.rs
//
// Audio acquisition from broadcast URLs. Source identification is done
// locally; the actual download is delegated to the yt-dlp executable,
// which handles every platform we care about and extracts mp3 audio.

use log::{info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use url::Url;

use crate::file_utils::ensure_directory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YouTube,
    Twitter,
    M3u8,
    Unknown,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::YouTube => "youtube",
            SourceKind::Twitter => "twitter",
            SourceKind::M3u8 => "m3u8",
            SourceKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("unsupported source URL: {0}")]
    UnsupportedSource(String),
    #[error("could not launch yt-dlp (is it installed?): {0}")]
    Spawn(std::io::Error),
    #[error("yt-dlp failed: {0}")]
    ToolFailed(String),
    #[error("expected downloaded audio at {0} but it does not exist")]
    MissingOutput(PathBuf),
    #[error("{0}")]
    WorkDir(String),
}

pub struct DownloadedAudio {
    pub path: PathBuf,
    pub title: String,
}

/// Identify the source type of a broadcast URL.
pub fn identify_source(url_str: &str) -> SourceKind {
    if url_str.contains(".m3u8") {
        return SourceKind::M3u8;
    }

    let parsed = match Url::parse(url_str) {
        Ok(u) => u,
        Err(_) => return SourceKind::Unknown,
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();

    if host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com") {
        SourceKind::YouTube
    } else if host == "twitter.com"
        || host.ends_with(".twitter.com")
        || host == "x.com"
        || host.ends_with(".x.com")
        || host == "pscp.tv"
        || host.ends_with(".pscp.tv")
    {
        SourceKind::Twitter
    } else {
        SourceKind::Unknown
    }
}

/// Download the audio track of a broadcast into `work_dir` as mp3.
/// Returns the audio path and the broadcast title.
pub async fn download_audio(url: &str, work_dir: &Path) -> Result<DownloadedAudio, DownloadError> {
    let source = identify_source(url);
    if source == SourceKind::Unknown {
        return Err(DownloadError::UnsupportedSource(url.to_string()));
    }
    info!("[Downloader] Identified source as {} for {}", source.as_str(), url);

    ensure_directory(work_dir).map_err(DownloadError::WorkDir)?;
    let output_template = work_dir.join("broadcast_audio.%(ext)s");
    let audio_path = work_dir.join("broadcast_audio.mp3");

    let output = Command::new("yt-dlp")
        .arg("--no-progress")
        .arg("--print-json")
        .arg("-x")
        .arg("--audio-format")
        .arg("mp3")
        .arg("-o")
        .arg(&output_template)
        .arg(url)
        .output()
        .await
        .map_err(DownloadError::Spawn)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DownloadError::ToolFailed(truncate(&stderr, 500)));
    }

    if !audio_path.exists() {
        return Err(DownloadError::MissingOutput(audio_path));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let title = parse_title_from_output(&stdout, source);
    info!("[Downloader] Downloaded '{}' to {}", title, audio_path.display());

    Ok(DownloadedAudio { path: audio_path, title })
}

#[derive(Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
}

/// Pull the broadcast title out of yt-dlp's info JSON. Falls back to a
/// timestamped generic name when the metadata is unusable.
fn parse_title_from_output(stdout: &str, source: SourceKind) -> String {
    for line in stdout.lines().rev() {
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        if let Ok(info) = serde_json::from_str::<YtDlpInfo>(line) {
            if let Some(title) = info.title.filter(|t| !t.trim().is_empty()) {
                return title;
            }
        }
    }
    warn!("[Downloader] No usable title in yt-dlp metadata, using a generated one");
    format!(
        "{}_broadcast_{}",
        source.as_str(),
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    )
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
