//! Configuration loading for radscope.
//! Reads radscope.toml from the current directory or the path in RADSCOPE_CONFIG,
//! then applies environment overrides (a `.env` file is honoured).

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_bind()          -> String  { "0.0.0.0:5000".to_string() }
fn default_upload_dir()    -> PathBuf { PathBuf::from("uploads") }
fn default_static_dir()    -> PathBuf { PathBuf::from("static") }
fn default_template_dir()  -> PathBuf { PathBuf::from("templates") }
fn default_max_upload_mb() -> usize   { 50 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            static_dir: default_static_dir(),
            template_dir: default_template_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

// ── Database ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Without a URL the server runs with persistence disabled.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> usize { 10 }
fn default_true()            -> bool  { true }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: default_max_connections(), run_migrations: true }
    }
}

// ── Object storage ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Supabase,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub supabase_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub supabase_key: Option<SecretString>,
}

fn default_local_dir() -> PathBuf { PathBuf::from("reports") }
fn default_bucket()    -> String  { "patient-reports".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_dir: default_local_dir(),
            bucket: default_bucket(),
            supabase_url: None,
            supabase_key: None,
        }
    }
}

// ── AI providers ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    /// Send uploads to the vision model for a second opinion on the body part.
    #[serde(default = "default_true")]
    pub vision_enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub openai: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
}

fn default_timeout_secs() -> u64 { 60 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self { vision_enabled: true, timeout_secs: default_timeout_secs(), openai: None, gemini: None }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

// ── Analysis ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_lesion_area")]
    pub min_lesion_area: usize,
    #[serde(default = "default_max_lesion_area")]
    pub max_lesion_area: usize,
    /// Used when the file has no PixelSpacing tag.
    #[serde(default = "default_pixel_spacing")]
    pub default_pixel_spacing_mm: f64,
    #[serde(default = "default_canny_low")]
    pub edge_low: f32,
    #[serde(default = "default_canny_high")]
    pub edge_high: f32,
    /// Fall back to filename keywords when no DICOM tag names the body part.
    #[serde(default = "default_true")]
    pub filename_hints: bool,
}

fn default_min_lesion_area() -> usize { 5 }
fn default_max_lesion_area() -> usize { 100 }
fn default_pixel_spacing()   -> f64   { 0.5 }
fn default_canny_low()       -> f32   { 50.0 }
fn default_canny_high()      -> f32   { 150.0 }

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_lesion_area: default_min_lesion_area(),
            max_lesion_area: default_max_lesion_area(),
            default_pixel_spacing_mm: default_pixel_spacing(),
            edge_low: default_canny_low(),
            edge_high: default_canny_high(),
            filename_hints: true,
        }
    }
}

// ── Patient sessions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_session_ttl()      -> u64 { 3600 }
fn default_cleanup_interval() -> u64 { 300 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: default_session_ttl(), cleanup_interval_secs: default_cleanup_interval() }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Load configuration from radscope.toml (or RADSCOPE_CONFIG), apply
    /// environment overrides and validate. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }

        let path = std::env::var("RADSCOPE_CONFIG")
            .unwrap_or_else(|_| "radscope.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Environment variables win over file values. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("RADSCOPE_BIND") {
            self.server.bind = bind;
        }
        if let Some(dir) = get("RADSCOPE_UPLOAD_DIR") {
            self.server.upload_dir = PathBuf::from(dir);
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.openai.get_or_insert_with(ProviderConfig::default).api_key =
                Some(SecretString::from(key));
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.llm.gemini.get_or_insert_with(ProviderConfig::default).api_key =
                Some(SecretString::from(key));
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.storage.supabase_url = Some(url);
        }
        if let Some(key) = get("SUPABASE_KEY") {
            self.storage.supabase_key = Some(SecretString::from(key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::Invalid("server.max_upload_mb must be > 0".into()));
        }
        if self.sessions.ttl_secs == 0 || self.sessions.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid("session intervals must be > 0".into()));
        }
        if self.analysis.min_lesion_area >= self.analysis.max_lesion_area {
            return Err(ConfigError::Invalid(format!(
                "analysis.min_lesion_area ({}) must be below max_lesion_area ({})",
                self.analysis.min_lesion_area, self.analysis.max_lesion_area
            )));
        }
        if self.analysis.default_pixel_spacing_mm <= 0.0 {
            return Err(ConfigError::Invalid("analysis.default_pixel_spacing_mm must be > 0".into()));
        }
        if self.storage.backend == StorageBackend::Supabase
            && (self.storage.supabase_url.is_none() || self.storage.supabase_key.is_none())
        {
            return Err(ConfigError::Invalid(
                "storage.backend = \"supabase\" requires SUPABASE_URL and SUPABASE_KEY".into(),
            ));
        }
        Ok(())
    }
}
