//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! A few settings can be overridden from the environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `OPENAI_BASE_URL` | `llm.base_url` |
//! | `OPENAI_MODEL` | `llm.model` |
//! | `INCIDENT_WEBHOOK_URL` | `incidents.webhook_url` |
//!
//! The API key is never read from the file; the chat client takes it from
//! `OPENAI_API_KEY` at call time.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub incidents: IncidentsConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_docs_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            dir: default_docs_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.markdown".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".local_index.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// System prompt for the documentation answerer.
    #[serde(default = "default_answer_instructions")]
    pub instructions: String,
    /// System prompt for the incident diagnoser.
    #[serde(default = "default_diagnosis_instructions")]
    pub diagnosis_instructions: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            instructions: default_answer_instructions(),
            diagnosis_instructions: default_diagnosis_instructions(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_answer_instructions() -> String {
    "You are a level 1 support agent. Answer questions using only the provided \
     documentation excerpts and always cite your sources. If the excerpts do not \
     contain the answer, say so."
        .to_string()
}
fn default_diagnosis_instructions() -> String {
    "You are a support engineer diagnosing production incidents. Use the incident \
     log summary you are given, be concise, and cite the executions you relied on."
        .to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IncidentsConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_incident_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IncidentsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_incident_timeout_secs(),
        }
    }
}

fn default_incident_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    /// Cache scope for this workflow instance.
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// SQLite file for persisted sessions. In-memory only when unset.
    #[serde(default)]
    pub session_db: Option<PathBuf>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Follow a fallback diagnosis with a remediation-steps request.
    #[serde(default)]
    pub remediation: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            session_db: None,
            cache_capacity: default_cache_capacity(),
            remediation: false,
        }
    }
}

fn default_session_id() -> String {
    "support".to_string()
}
fn default_cache_capacity() -> u64 {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Parse and validate configuration text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }

    if config.workflow.cache_capacity == 0 {
        anyhow::bail!("workflow.cache_capacity must be >= 1");
    }
    if config.workflow.session_id.trim().is_empty() {
        anyhow::bail!("workflow.session_id must not be empty");
    }

    Ok(config)
}

impl Config {
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Ok(url) = std::env::var("INCIDENT_WEBHOOK_URL") {
            self.incidents.webhook_url = Some(url);
        }
    }
}
