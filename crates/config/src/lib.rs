//! Configuration loading, validation, and management for polibrief.
//!
//! Loads configuration from `~/.polibrief/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.polibrief/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Text-generation backend
    #[serde(default)]
    pub generation: GenerationConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token signing and lifetimes
    #[serde(default)]
    pub auth: AuthConfig,

    /// Report assembly limits and cache policy
    #[serde(default)]
    pub research: ResearchConfig,

    /// Web search backend used to gather source documents
    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// --- generation ---

#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// `gemini`, `openai`, `openrouter`, `ollama`, or any OpenAI-compatible name
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override; the provider's public endpoint when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Upper bound for a single generation attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-1.5-pro".into()
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            api_url: None,
            temperature: 0.0,
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

// --- gateway ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS origins; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Requests per client per minute; 0 disables limiting
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_rate_limit() -> u32 {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
            body_limit_bytes: default_body_limit(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

// --- database ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL; `sqlite::memory:` for an ephemeral database
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://polibrief.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

// --- auth ---

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_access_ttl")]
    pub access_ttl_minutes: i64,

    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_days: i64,
}

fn default_access_ttl() -> i64 {
    60
}
fn default_refresh_ttl() -> i64 {
    1
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            access_ttl_minutes: default_access_ttl(),
            refresh_ttl_days: default_refresh_ttl(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .finish()
    }
}

// --- research ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Cache age used when a request does not pass `max_age`
    #[serde(default = "default_max_age_days")]
    pub default_max_age_days: i64,

    /// Characters kept from each document in a prompt
    #[serde(default = "default_per_document_chars")]
    pub per_document_chars: usize,

    /// Characters kept from the whole source block in a prompt
    #[serde(default = "default_total_content_chars")]
    pub total_content_chars: usize,

    #[serde(default = "default_max_documents")]
    pub max_documents: usize,

    #[serde(default = "default_results_per_query")]
    pub num_results_per_query: usize,

    /// Documents with less extracted text than this are dropped
    #[serde(default = "default_min_document_chars")]
    pub min_document_chars: usize,

    /// Ask for policy stances after the summary
    #[serde(default = "default_true")]
    pub policy_stances: bool,

    /// Look up party, short bio, and portrait after the summary
    #[serde(default = "default_true")]
    pub profile: bool,
}

fn default_max_age_days() -> i64 {
    7
}
fn default_per_document_chars() -> usize {
    5_000
}
fn default_total_content_chars() -> usize {
    100_000
}
fn default_max_documents() -> usize {
    20
}
fn default_results_per_query() -> usize {
    2
}
fn default_min_document_chars() -> usize {
    500
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            default_max_age_days: default_max_age_days(),
            per_document_chars: default_per_document_chars(),
            total_content_chars: default_total_content_chars(),
            max_documents: default_max_documents(),
            num_results_per_query: default_results_per_query(),
            min_document_chars: default_min_document_chars(),
            policy_stances: true,
            profile: true,
        }
    }
}

// --- sources ---

#[derive(Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// JSON search endpoint answering `GET ?q=<query>&count=<n>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    15
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            search_url: None,
            search_api_key: None,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl std::fmt::Debug for SourcesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcesConfig")
            .field("search_url", &self.search_url)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .finish()
    }
}

// --- chat ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Temporary chats older than this are purged by `cleanup-chats`
    #[serde(default = "default_temporary_ttl")]
    pub temporary_ttl_hours: i64,

    /// Prior Q&A pairs included as conversation context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_temporary_ttl() -> i64 {
    24
}
fn default_history_limit() -> usize {
    5
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temporary_ttl_hours: default_temporary_ttl(),
            history_limit: default_history_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.polibrief/config.toml)
    /// and apply environment overrides.
    ///
    /// API key precedence: config file, `POLIBRIEF_API_KEY`, then the vendor
    /// variable matching the provider (`GEMINI_API_KEY`, `OPENROUTER_API_KEY`,
    /// `OPENAI_API_KEY`).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load a specific file and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.generation.api_key.is_none() {
            let vendor = match self.generation.provider.as_str() {
                "gemini" => "GEMINI_API_KEY",
                "openrouter" => "OPENROUTER_API_KEY",
                _ => "OPENAI_API_KEY",
            };
            self.generation.api_key = lookup("POLIBRIEF_API_KEY").or_else(|| lookup(vendor));
        }
        if let Some(provider) = lookup("POLIBRIEF_PROVIDER") {
            self.generation.provider = provider;
        }
        if let Some(model) = lookup("POLIBRIEF_MODEL") {
            self.generation.model = model;
        }
        if let Some(url) = lookup("POLIBRIEF_API_URL") {
            self.generation.api_url = Some(url);
        }
        if let Some(url) = lookup("DATABASE_URL").or_else(|| lookup("POLIBRIEF_DATABASE_URL")) {
            self.database.url = url;
        }
        if let Some(secret) = lookup("POLIBRIEF_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(host) = lookup("POLIBRIEF_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = lookup("POLIBRIEF_PORT").and_then(|p| p.parse().ok()) {
            self.gateway.port = port;
        }
        if let Some(url) = lookup("POLIBRIEF_SEARCH_URL") {
            self.sources.search_url = Some(url);
        }
        if let Some(key) = lookup("POLIBRIEF_SEARCH_API_KEY") {
            self.sources.search_api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".polibrief")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if !(0.0..=2.0).contains(&generation.temperature) {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if generation.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "generation.timeout_secs must be > 0".into(),
            ));
        }
        if self.sources.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "sources.fetch_timeout_secs must be > 0".into(),
            ));
        }
        if self.research.default_max_age_days < 0 {
            return Err(ConfigError::ValidationError(
                "research.default_max_age_days must be >= 0".into(),
            ));
        }
        if self.auth.access_ttl_minutes <= 0 || self.auth.refresh_ttl_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth token lifetimes must be > 0".into(),
            ));
        }
        if self.research.per_document_chars == 0 || self.research.total_content_chars == 0 {
            return Err(ConfigError::ValidationError(
                "research content limits must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Extra checks for running the HTTP server.
    pub fn validate_for_serving(&self) -> Result<(), ConfigError> {
        self.validate()?;
        match self.auth.jwt_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::ValidationError(
                "auth.jwt_secret must be set (or POLIBRIEF_JWT_SECRET) to serve".into(),
            )),
        }
    }

    /// Check if a generation API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.generation.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for polibrief_core::Error {
    fn from(err: ConfigError) -> Self {
        polibrief_core::Error::Config {
            message: err.to_string(),
        }
    }
}
