use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::specification::{MAX_CUSTOM_VALUE_CHARS, MIN_CUSTOM_VALUE_CHARS};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for BikeForge
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BikeForgeConfig {
    /// Conversational and relevance oracle configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Image oracle configuration
    #[serde(default)]
    pub image: ImageConfig,

    /// Custom field validation
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Dialogue driver limits
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP server binding
    #[serde(default)]
    pub server: ServerConfig,
}

/// LLM configuration for the conversational and relevance oracles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// LLM provider: "openai" or "openai-compatible"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Base URL of the chat-completions endpoint
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// API key (OPENAI_API_KEY takes precedence)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model driving the question dialogue
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Model used for custom field relevance checks and safety reviews
    #[serde(default = "default_validation_model")]
    pub validation_model: String,

    /// Temperature for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries on transport failure before a turn is reported unavailable
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_openai_base_url(),
            api_key: None,
            chat_model: default_chat_model(),
            validation_model: default_validation_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Image oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Base URL of the image generation endpoint
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// API key (falls back to the LLM key, then OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Image model, e.g. "dall-e-3" or "gpt-image-1"
    #[serde(default = "default_image_model")]
    pub model: String,

    /// Requested image size
    #[serde(default = "default_image_size")]
    pub size: String,

    /// Request timeout in seconds
    #[serde(default = "default_image_timeout_secs")]
    pub timeout_secs: u64,

    /// Credits deducted per successful render
    #[serde(default = "default_credit_cost")]
    pub credit_cost: u32,

    /// Review custom fields for content policy problems before rendering
    #[serde(default)]
    pub safety_precheck: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_image_model(),
            size: default_image_size(),
            timeout_secs: default_image_timeout_secs(),
            credit_cost: default_credit_cost(),
            safety_precheck: false,
        }
    }
}

impl ImageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Custom field validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Ask the relevance oracle whether custom values describe the bike
    #[serde(default = "default_true")]
    pub semantic_enabled: bool,

    #[serde(default = "default_min_custom_chars")]
    pub min_custom_chars: usize,

    #[serde(default = "default_max_custom_chars")]
    pub max_custom_chars: usize,

    /// Timeout of a single relevance check in seconds
    #[serde(default = "default_validation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            min_custom_chars: default_min_custom_chars(),
            max_custom_chars: default_max_custom_chars(),
            timeout_secs: default_validation_timeout_secs(),
        }
    }
}

impl ValidationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dialogue driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Upper bound on a single conversational oracle call, in seconds
    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Follow-up questions allowed per parent catalog question
    #[serde(default = "default_max_follow_ups")]
    pub max_follow_ups: u32,

    /// Maximum length of the composed image prompt
    #[serde(default = "default_prompt_max_chars")]
    pub prompt_max_chars: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_secs: default_oracle_timeout_secs(),
            max_follow_ups: default_max_follow_ups(),
            prompt_max_chars: default_prompt_max_chars(),
        }
    }
}

impl DialogueConfig {
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o".to_string()
}
fn default_validation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> usize {
    2048
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_image_model() -> String {
    "dall-e-3".to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}
fn default_image_timeout_secs() -> u64 {
    180
}
fn default_credit_cost() -> u32 {
    1
}
fn default_min_custom_chars() -> usize {
    MIN_CUSTOM_VALUE_CHARS
}
fn default_max_custom_chars() -> usize {
    MAX_CUSTOM_VALUE_CHARS
}
fn default_validation_timeout_secs() -> u64 {
    15
}
fn default_oracle_timeout_secs() -> u64 {
    90
}
fn default_max_follow_ups() -> u32 {
    3
}
fn default_prompt_max_chars() -> usize {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}

/// Shortest prompt bound that still leaves room for the rendering suffix
/// appended by the image prompt composer.
pub const MIN_PROMPT_MAX_CHARS: usize = 600;

/// Configuration manager with env, file and default layering
pub struct ConfigManager {
    config: BikeForgeConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.bikeforge.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading BikeForge configuration...");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        info!("Configuration loaded successfully");
        match config_path {
            Some(ref path) => info!("   Config file: {}", path.display()),
            None => info!("   Config file: NONE (using defaults)"),
        }
        info!("   Chat model: {}", config.llm.chat_model);
        info!("   Image model: {}", config.image.model);
        info!(
            "   Semantic validation: {}",
            if config.validation.semantic_enabled {
                "enabled"
            } else {
                "disabled (length checks only)"
            }
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load configuration from an explicit TOML file, still honouring
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration (tests, embedding).
    pub fn from_config(config: BikeForgeConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".bikeforge.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .bikeforge.env: {}", e);
                } else {
                    info!("Loaded .bikeforge.env from home directory");
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.bikeforge.toml (current directory)
    /// 2. ~/.bikeforge/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(BikeForgeConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".bikeforge.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".bikeforge").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((BikeForgeConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<BikeForgeConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(config: BikeForgeConfig) -> BikeForgeConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup; `apply_env_overrides` passes the
    /// process environment.
    pub fn apply_overrides<F>(mut config: BikeForgeConfig, lookup: F) -> BikeForgeConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        // LLM configuration
        if let Some(key) = lookup("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.llm.base_url = url.clone();
            config.image.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Some(model) = lookup("OPENAI_VALIDATION_MODEL") {
            config.llm.validation_model = model;
        }
        if let Some(provider) = lookup("BIKEFORGE_LLM_PROVIDER") {
            config.llm.provider = provider;
        }

        // Image configuration
        if let Some(model) = lookup("OPENAI_IMAGE_MODEL") {
            config.image.model = model;
        }
        if let Some(cost) = lookup("BIKEFORGE_IMAGE_CREDIT_COST") {
            if let Ok(c) = cost.parse() {
                config.image.credit_cost = c;
            }
        }

        // Validation
        if let Some(enable) = lookup("ENABLE_LLM_VALIDATION") {
            config.validation.semantic_enabled = enable.to_lowercase() == "true" || enable == "1";
        }

        // Dialogue
        if let Some(timeout) = lookup("BIKEFORGE_ORACLE_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                config.dialogue.oracle_timeout_secs = secs;
            }
        }
        if let Some(max) = lookup("BIKEFORGE_PROMPT_MAX_CHARS") {
            if let Ok(chars) = max.parse() {
                config.dialogue.prompt_max_chars = chars;
            }
        }

        // Logging
        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("BIKEFORGE_LOG_FORMAT") {
            config.logging.format = format;
        }

        // Server
        if let Some(host) = lookup("BIKEFORGE_HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("BIKEFORGE_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }

        config
    }

    pub fn validate_config(config: &BikeForgeConfig) -> Result<(), ConfigError> {
        match config.llm.provider.as_str() {
            "openai" | "openai-compatible" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid LLM provider: {}. Must be one of: openai, openai-compatible",
                    other
                )))
            }
        }

        // RUST_LOG may carry a full filter directive such as "bikeforge_api=debug"
        let level = config.logging.level.to_lowercase();
        if !level.contains('=') && !level.contains(',') {
            match level.as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        other
                    )))
                }
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        if config.llm.timeout_secs == 0
            || config.image.timeout_secs == 0
            || config.dialogue.oracle_timeout_secs == 0
            || config.validation.timeout_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        let validation = &config.validation;
        if validation.min_custom_chars < MIN_CUSTOM_VALUE_CHARS
            || validation.max_custom_chars > MAX_CUSTOM_VALUE_CHARS
        {
            return Err(ConfigError::ValidationError(format!(
                "Custom value bounds must lie within {}..={} characters",
                MIN_CUSTOM_VALUE_CHARS, MAX_CUSTOM_VALUE_CHARS
            )));
        }

        if config.validation.min_custom_chars > config.validation.max_custom_chars {
            return Err(ConfigError::ValidationError(format!(
                "min_custom_chars ({}) exceeds max_custom_chars ({})",
                config.validation.min_custom_chars, config.validation.max_custom_chars
            )));
        }

        if config.dialogue.max_follow_ups == 0 {
            return Err(ConfigError::ValidationError(
                "max_follow_ups must be at least 1".to_string(),
            ));
        }

        if config.dialogue.prompt_max_chars < MIN_PROMPT_MAX_CHARS {
            return Err(ConfigError::ValidationError(format!(
                "prompt_max_chars must be at least {}",
                MIN_PROMPT_MAX_CHARS
            )));
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BikeForgeConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = BikeForgeConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BikeForgeConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert!(config.validation.semantic_enabled);
        assert_eq!(config.dialogue.max_follow_ups, 3);
        assert_eq!(config.dialogue.prompt_max_chars, 1000);
        assert_eq!(config.validation.min_custom_chars, 3);
        assert_eq!(config.validation.max_custom_chars, 500);
    }

    #[test]
    fn test_config_validation() {
        let config = BikeForgeConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_config = config.clone();
        bad_config.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config.clone();
        bad_config.dialogue.max_follow_ups = 0;
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config.clone();
        bad_config.dialogue.prompt_max_chars = 100;
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config;
        bad_config.validation.min_custom_chars = 60;
        bad_config.validation.max_custom_chars = 40;
        assert!(ConfigManager::validate_config(&bad_config).is_err());
    }

    #[test]
    fn test_custom_value_bounds_are_capped() {
        let mut config = BikeForgeConfig::default();
        config.validation.max_custom_chars = 501;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = BikeForgeConfig::default();
        config.validation.min_custom_chars = 2;
        assert!(ConfigManager::validate_config(&config).is_err());

        let mut config = BikeForgeConfig::default();
        config.validation.min_custom_chars = 10;
        config.validation.max_custom_chars = 200;
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_env_api_key_replaces_file_key() {
        let mut config = BikeForgeConfig::default();
        config.llm.api_key = Some("sk-from-file".to_string());

        let config = ConfigManager::apply_overrides(config, |key| {
            (key == "OPENAI_API_KEY").then(|| "sk-from-env".to_string())
        });
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-from-env"));

        let mut config = BikeForgeConfig::default();
        config.llm.api_key = Some("sk-from-file".to_string());
        let config = ConfigManager::apply_overrides(config, |_| None);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-from-file"));
    }

    #[test]
    fn test_log_filter_directive_is_accepted() {
        let mut config = BikeForgeConfig::default();
        config.logging.level = "bikeforge_api=debug,tower_http=info".to_string();
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_CHAT_MODEL", "gpt-4.1"),
            ("OPENAI_IMAGE_MODEL", "gpt-image-1"),
            ("ENABLE_LLM_VALIDATION", "false"),
            ("BIKEFORGE_ORACLE_TIMEOUT_SECS", "12"),
            ("BIKEFORGE_PORT", "not-a-port"),
        ]);
        let config = ConfigManager::apply_overrides(BikeForgeConfig::default(), |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.chat_model, "gpt-4.1");
        assert_eq!(config.image.model, "gpt-image-1");
        assert!(!config.validation.semantic_enabled);
        assert_eq!(config.dialogue.oracle_timeout_secs, 12);
        assert_eq!(config.server.port, 8000);
    }
}
