use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use directories::ProjectDirs;
use log::{info, warn};
use toml;

/// Top-level application settings, loaded from config.toml.
///
/// Loaded once in main and passed by reference into the pipeline; there is
/// deliberately no global settings singleton so tests can build their own.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub transcription: TranscriptionSettings,
    #[serde(default)]
    pub correction: CorrectionSettings,
}

/// Settings for the generative text service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LlmSettings {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_fallback_model")]
    pub fallback_model: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_llm_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

/// Settings for the speech-to-text service.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TranscriptionSettings {
    #[serde(default = "default_transcription_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_transcription_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_audio_mb")]
    pub max_audio_mb: u64,
    #[serde(default = "default_transcription_max_attempts")]
    pub max_attempts: u32,
}

/// Settings for the terminology correction subsystem.
///
/// The confidence thresholds gate which stored corrections are applied
/// immediately versus deferred; they are configuration, not code.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CorrectionSettings {
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f64,
    #[serde(default = "default_medium_confidence_threshold")]
    pub medium_confidence_threshold: f64,
    #[serde(default = "default_analyzer_transcript_limit")]
    pub analyzer_transcript_limit: usize,
    /// Override for the corrections database path. Defaults under data_dir.
    #[serde(default)]
    pub database_file: Option<PathBuf>,
    /// Override for the known-terms reference file. Defaults under resources/.
    #[serde(default)]
    pub terms_file: Option<PathBuf>,
    /// Override for the known-people reference file. Defaults under resources/.
    #[serde(default)]
    pub people_file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    get_project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_llm_model() -> String {
    "gemini-1.5-pro-002".to_string()
}

fn default_llm_fallback_model() -> String {
    "gemini-1.5-flash-002".to_string()
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_llm_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_initial_retry_delay_ms() -> u64 {
    1000
}

fn default_llm_max_retry_delay_ms() -> u64 {
    32_000
}

fn default_transcription_endpoint() -> String {
    "https://api.fal.ai/whisper/transcribe".to_string()
}

fn default_transcription_api_key_env() -> String {
    "TRANSCRIPTION_API_KEY".to_string()
}

fn default_max_audio_mb() -> u64 {
    50
}

fn default_transcription_max_attempts() -> u32 {
    5
}

fn default_high_confidence_threshold() -> f64 {
    0.75
}

fn default_medium_confidence_threshold() -> f64 {
    0.6
}

fn default_analyzer_transcript_limit() -> usize {
    20_000
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            fallback_model: default_llm_fallback_model(),
            endpoint: default_llm_endpoint(),
            api_key_env: default_llm_api_key_env(),
            max_retries: default_llm_max_retries(),
            initial_retry_delay_ms: default_llm_initial_retry_delay_ms(),
            max_retry_delay_ms: default_llm_max_retry_delay_ms(),
        }
    }
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_transcription_endpoint(),
            api_key_env: default_transcription_api_key_env(),
            max_audio_mb: default_max_audio_mb(),
            max_attempts: default_transcription_max_attempts(),
        }
    }
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            high_confidence_threshold: default_high_confidence_threshold(),
            medium_confidence_threshold: default_medium_confidence_threshold(),
            analyzer_transcript_limit: default_analyzer_transcript_limit(),
            database_file: None,
            terms_file: None,
            people_file: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            llm: LlmSettings::default(),
            transcription: TranscriptionSettings::default(),
            correction: CorrectionSettings::default(),
        }
    }
}

fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "castnotes", "Castnotes")
}

fn get_default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

impl Settings {
    /// Load settings from the given path, or from the standard config
    /// location when no path is given. A missing file produces (and saves)
    /// defaults; a malformed file falls back to defaults with a warning.
    pub fn load(config_path: Option<PathBuf>) -> Settings {
        let path = match config_path.or_else(get_default_config_path) {
            Some(p) => p,
            None => {
                warn!("[Config] Could not determine config path, using default settings");
                return Settings::default();
            }
        };

        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Settings>(&contents) {
                Ok(settings) => {
                    info!("[Config] Settings loaded from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("[Config] Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Settings::default()
                }
            },
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Config] No config file at {}, creating default", path.display());
                let settings = Settings::default();
                if let Err(e) = settings.save(&path) {
                    warn!("[Config] Failed to write default config: {}", e);
                }
                settings
            }
            Err(e) => {
                warn!("[Config] Failed to read {}: {}. Using defaults.", path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize settings: {}", e))?;
        fs::write(path, contents).map_err(|e| format!("Failed to write config: {}", e))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.data_dir.join("prompts")
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.data_dir.join("resources")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join(".tmp")
    }

    pub fn correction_db_file(&self) -> PathBuf {
        self.correction
            .database_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("term_corrections.sqlite3"))
    }

    pub fn terms_file(&self) -> PathBuf {
        self.correction
            .terms_file
            .clone()
            .unwrap_or_else(|| self.resources_dir().join("known_terms.json"))
    }

    pub fn people_file(&self) -> PathBuf {
        self.correction
            .people_file
            .clone()
            .unwrap_or_else(|| self.resources_dir().join("known_people.json"))
    }
}
