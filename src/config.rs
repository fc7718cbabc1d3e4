use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// "openai" (Responses API), "openai-chat" (Chat Completions, for
    /// compatible servers such as Ollama or vLLM) or "mock"
    #[serde(default = "default_provider")]
    pub provider: String,
    pub base_url: String,
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for transport failures only. 0 means a failed call aborts
    /// the operation immediately.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Fast model for fitness, style, extraction, coverage and summaries
    pub classifier: String,
    /// Model for the final evidence text
    pub writer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisInput {
    Competencies,
    Coverage,
    EvidenceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent fitness calls during a scan (1 = one record at a time)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Run the independent analysis stages of one evidence run concurrently
    #[serde(default)]
    pub parallel_stages: bool,

    /// Prior-stage outputs merged into the synthesis prompt; their sections
    /// appear in this order, each at most once
    #[serde(default = "default_synthesis_inputs")]
    pub synthesis_inputs: Vec<SynthesisInput>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            parallel_stages: false,
            synthesis_inputs: default_synthesis_inputs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Directory with `<template_id>.md` files replacing the built-ins
    #[serde(default)]
    pub templates_dir: Option<String>,

    /// Text appended to a rendered template, keyed by template id
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "default_category_column")]
    pub category_column: String,
    #[serde(default = "default_competence_column")]
    pub competence_column: String,
    #[serde(default = "default_note_column")]
    pub note_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            category_column: default_category_column(),
            competence_column: default_competence_column(),
            note_column: default_note_column(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_concurrency() -> usize {
    1
}

fn default_synthesis_inputs() -> Vec<SynthesisInput> {
    vec![SynthesisInput::Competencies, SynthesisInput::EvidenceSummary]
}

fn default_category_column() -> String {
    "Kompetenzkategorie".to_string()
}

fn default_competence_column() -> String {
    "Kompetenz".to_string()
}

fn default_note_column() -> String {
    "Bemerkung".to_string()
}

fn default_delimiter() -> char {
    ','
}

impl Config {
    /// Load config from the working directory or user config directory
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Load configuration from a specific path, or use default search paths
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path));
        }

        if Path::new("evidencer.toml").is_file() {
            debug!("Loading config from ./evidencer.toml");
            return Self::load_from_path("evidencer.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("evidencer").join("config.toml");
            if config_path.is_file() {
                debug!("Loading config from {:?}", config_path);
                return Self::load_from_path(&config_path);
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check required and ranged fields before any model call is made.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url is required");
        }
        match self.api.provider.as_str() {
            "openai" | "openai-chat" | "mock" => {}
            unknown => bail!("Unknown API provider: {}", unknown),
        }
        if let Some(t) = self.api.temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("api.temperature must be between 0.0 and 2.0, got {}", t);
            }
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be greater than 0");
        }
        if self.models.classifier.trim().is_empty() {
            bail!("models.classifier is required");
        }
        if self.models.writer.trim().is_empty() {
            bail!("models.writer is required");
        }
        if self.pipeline.max_concurrency == 0 {
            bail!("pipeline.max_concurrency must be at least 1");
        }
        if self.pipeline.synthesis_inputs.is_empty() {
            bail!("pipeline.synthesis_inputs must name at least one input");
        }
        let inputs = &self.pipeline.synthesis_inputs;
        for (i, input) in inputs.iter().enumerate() {
            if inputs[..i].contains(input) {
                bail!("pipeline.synthesis_inputs lists {:?} more than once", input);
            }
        }
        Ok(())
    }

    /// Get API key from environment variable specified in config
    pub fn get_api_key(&self) -> Result<String> {
        match &self.api.api_key_env {
            Some(env_var) => {
                // "none" means no API key needed (e.g., a local server)
                if env_var.to_lowercase() == "none" {
                    return Ok(String::new());
                }

                // Compatible servers often run without auth; use the key if present
                if self.api.provider == "openai-chat" {
                    return Ok(env::var(env_var).unwrap_or_default());
                }

                env::var(env_var).map_err(|_| {
                    anyhow::anyhow!("API key not found in environment variable: {}", env_var)
                })
            }
            None => Ok(String::new()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                provider: default_provider(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                temperature: None,
                max_output_tokens: None,
                timeout_secs: default_timeout_secs(),
                max_retries: 0,
                retry_backoff_ms: default_retry_backoff_ms(),
            },
            models: ModelsConfig {
                classifier: "gpt-4.1-mini".to_string(),
                writer: "gpt-4.1".to_string(),
            },
            pipeline: PipelineConfig::default(),
            prompts: PromptsConfig::default(),
            skills: SkillsConfig::default(),
        }
    }
}
