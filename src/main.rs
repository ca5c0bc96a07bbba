// Castnotes: turns a recorded broadcast into a polished written summary.
//
// download audio -> transcribe -> clean -> correct terminology ->
// extract topics -> summarize -> write Markdown

use clap::Parser;
use log::{error, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod correction_applier;
mod correction_store;
mod downloader;
mod file_utils;
mod json_utils;
mod llm_client;
mod pipeline;
mod reference_data;
mod summarizer;
mod term_analyzer;
mod term_corrector;
mod topic_extractor;
mod transcript_cleaner;
mod transcription;

use crate::correction_store::{CorrectionStore, NewCorrection};
use crate::llm_client::LlmClient;
use crate::term_analyzer::TermAnalyzer;
use crate::term_corrector::{CorrectionThresholds, TermCorrector};
use crate::transcription::TranscriptionClient;

#[derive(Parser, Debug)]
#[command(name = "castnotes", version, about = "Turns recorded broadcasts into polished written summaries")]
struct Cli {
    /// URL of the broadcast to process (YouTube, Twitter/X broadcast, or m3u8)
    url: Option<String>,

    /// Prompt template type (looked up as <template>.txt in the prompts directory)
    #[arg(long, default_value = "default")]
    template: String,

    /// Override the generation model from config
    #[arg(long)]
    model: Option<String>,

    /// Path to a config.toml (defaults to the standard config location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Import manual corrections from a JSON file of {"incorrect": "correct"}
    /// pairs into the knowledge base, then exit
    #[arg(long)]
    seed_terms: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut settings = config::Settings::load(cli.config);
    if let Some(model) = cli.model {
        settings.llm.model = model;
    }

    // The corrections database is useful but never required: fall back to
    // an in-memory store so a broken file cannot block a run.
    let store = match CorrectionStore::connect(&settings.correction_db_file()).await {
        Ok(store) => store,
        Err(e) => {
            warn!("[Main] Corrections database unavailable ({}), continuing without persistence", e);
            match CorrectionStore::in_memory().await {
                Ok(store) => store,
                Err(e) => {
                    error!("[Main] Could not open even an in-memory store: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    if let Some(seed_path) = cli.seed_terms {
        match seed_corrections(&store, &seed_path).await {
            Ok(count) => {
                println!("Imported {} manual corrections from {}", count, seed_path.display());
                return;
            }
            Err(e) => {
                eprintln!("Seed import failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let url = match cli.url {
        Some(url) => url,
        None => {
            eprintln!("A broadcast URL is required (or use --seed-terms). See --help.");
            std::process::exit(2);
        }
    };

    let api_key = match std::env::var(&settings.llm.api_key_env) {
        Ok(key) => key,
        Err(_) => {
            eprintln!("No API key for the generation service: set {}", settings.llm.api_key_env);
            std::process::exit(1);
        }
    };
    let llm = match LlmClient::new(settings.llm.clone(), api_key) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Failed to initialize generation client: {}", e);
            std::process::exit(1);
        }
    };

    let transcription_key = std::env::var(&settings.transcription.api_key_env).ok();
    let transcriber = match TranscriptionClient::new(settings.transcription.clone(), transcription_key) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to initialize transcription client: {}", e);
            std::process::exit(1);
        }
    };

    let terms = reference_data::load_terms(&settings.terms_file());
    let people = reference_data::load_people(&settings.people_file());

    let analyzer = TermAnalyzer::new(llm.clone(), settings.correction.analyzer_transcript_limit);
    let thresholds = CorrectionThresholds::new(
        settings.correction.high_confidence_threshold,
        settings.correction.medium_confidence_threshold,
    );
    let corrector = TermCorrector::new(store, analyzer, terms.clone(), people.clone(), thresholds);

    match pipeline::process_broadcast(
        &settings,
        &corrector,
        &llm,
        &transcriber,
        &terms,
        &people,
        &url,
        &cli.template,
    )
    .await
    {
        Ok(summary_path) => {
            println!("Summary generated: {}", summary_path.display());
        }
        Err(e) => {
            error!("[Main] Processing failed: {}", e);
            eprintln!("Processing failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Import manually curated corrections (confidence 1.0, manual provenance)
/// into the knowledge base. They flow through the same applier as every
/// other correction on subsequent runs.
async fn seed_corrections(store: &CorrectionStore, path: &Path) -> Result<usize, String> {
    let contents = file_utils::read_file(path)?;
    let pairs: HashMap<String, String> =
        serde_json::from_str(&contents).map_err(|e| format!("could not parse {}: {}", path.display(), e))?;
    let records: Vec<NewCorrection> = pairs
        .iter()
        .map(|(incorrect, correct)| NewCorrection::manual(incorrect, correct))
        .collect();
    Ok(store.upsert_many(&records).await)
}
