//! Configuration management for the course tutor.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Config files (.tutor/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! Settings that an operator can change at runtime (active model, active
//! File Search store) are not read here directly. They are resolved once per
//! request through a [`SettingsProvider`], see [`GenerationSettings::resolve`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Persisted setting key for the retrieval (answering) model.
pub const SETTING_RETRIEVAL_MODEL: &str = "gemini_retrieval_model";
/// Persisted setting key for the greeting model.
pub const SETTING_GREETING_MODEL: &str = "gemini_greeting_model";
/// Persisted setting key for the generic model, used by greetings as a fallback.
pub const SETTING_MODEL: &str = "gemini_model";
/// Persisted setting key for the File Search store.
pub const SETTING_STORE_NAME: &str = "file_search_store_name";

/// All keys accepted by the settings store.
pub const KNOWN_SETTINGS: &[&str] = &[
    SETTING_RETRIEVAL_MODEL,
    SETTING_GREETING_MODEL,
    SETTING_MODEL,
    SETTING_STORE_NAME,
];

pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .tutor/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Values captured from the process environment at load time
    pub env: EnvSettings,

    /// Retrieval model forced from the command line
    pub model_override: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Generation service parameters
    pub generation: GenerationConfig,

    /// Overrides for the tuned grounding constants
    pub grounding: GroundingOverrides,

    /// Optional prompt profile YAML replacing the built-in instructions
    pub prompt_profile: Option<PathBuf>,
}

/// Environment-provided values, the third tier of setting resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvSettings {
    pub api_key: Option<String>,
    pub store_name: Option<String>,
    pub retrieval_model: Option<String>,
    pub greeting_model: Option<String>,
    pub model: Option<String>,
}

impl EnvSettings {
    /// Capture the tutor's environment variables.
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            api_key: read("GEMINI_API_KEY"),
            store_name: read("FILE_SEARCH_STORE_NAME"),
            retrieval_model: read("GEMINI_RETRIEVAL_MODEL"),
            greeting_model: read("GEMINI_GREETING_MODEL"),
            model: read("GEMINI_MODEL"),
        }
    }
}

/// Parameters of the evidence/generation HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Output token budget for answer calls
    #[serde(default = "default_answer_tokens")]
    pub answer_max_output_tokens: u32,

    /// Output token budget for greeting calls
    #[serde(default = "default_greeting_tokens")]
    pub greeting_max_output_tokens: u32,

    /// Model used when the primary one spends its whole budget thinking
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Minimum output budget for the fallback-model call
    #[serde(default = "default_fallback_tokens")]
    pub fallback_min_output_tokens: u32,

    /// Connect timeout; no total request timeout is applied
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_answer_tokens() -> u32 {
    1500
}

fn default_greeting_tokens() -> u32 {
    360
}

fn default_fallback_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_fallback_tokens() -> u32 {
    2200
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            answer_max_output_tokens: default_answer_tokens(),
            greeting_max_output_tokens: default_greeting_tokens(),
            fallback_model: default_fallback_model(),
            fallback_min_output_tokens: default_fallback_tokens(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Optional overrides for the grounding and retrieval constants.
///
/// Unset fields keep the built-in values of the grounding policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingOverrides {
    pub min_coverage: Option<f64>,
    pub min_supports_without_coverage: Option<usize>,
    pub selection_margin: Option<f64>,
    pub term_coverage_min: Option<f64>,
    pub unfiltered_top_k: Option<u32>,
    pub scoped_unfiltered_top_k: Option<u32>,
    pub filtered_top_k: Option<u32>,
    pub scoped_filtered_top_k: Option<u32>,
    pub rescue_top_k_floor: Option<u32>,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    generation: Option<GenerationConfig>,
    grounding: Option<GroundingOverrides>,
    logging: Option<LoggingConfig>,
    prompt: Option<PromptFileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptFileConfig {
    profile: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            env: EnvSettings::default(),
            model_override: None,
            log_level: None,
            verbose: false,
            no_color: false,
            generation: GenerationConfig::default(),
            grounding: GroundingOverrides::default(),
            prompt_profile: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `TUTOR_WORKSPACE`: Override workspace path
    /// - `TUTOR_CONFIG`: Path to config file
    /// - `GEMINI_API_KEY`, `FILE_SEARCH_STORE_NAME`: credentials and index
    /// - `GEMINI_RETRIEVAL_MODEL`, `GEMINI_GREETING_MODEL`, `GEMINI_MODEL`: model fallbacks
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("TUTOR_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("TUTOR_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.tutor_dir().join("config.yaml"));

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|e| {
                AppError::Config(format!("Failed to read config file {:?}: {}", config_path, e))
            })?;
            config = config.merge_yaml(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse config file {:?}: {}", config_path, e))
            })?;
        }

        config.env = EnvSettings::from_env();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }
        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration text into a copy of this config.
    pub fn merge_yaml(&self, contents: &str) -> AppResult<Self> {
        let config_file: ConfigFile = serde_yaml::from_str(contents)?;
        let mut result = self.clone();

        if let Some(generation) = config_file.generation {
            result.generation = generation;
        }

        if let Some(grounding) = config_file.grounding {
            result.grounding = grounding;
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(profile) = config_file.prompt.and_then(|p| p.profile) {
            let path = PathBuf::from(profile);
            result.prompt_profile = Some(if path.is_absolute() {
                path
            } else {
                result.workspace.join(path)
            });
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(model) = model {
            self.model_override = Some(model);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .tutor directory.
    pub fn tutor_dir(&self) -> PathBuf {
        self.workspace.join(".tutor")
    }

    /// Path of the SQLite database holding turns, snapshots, analytics and settings.
    pub fn database_path(&self) -> PathBuf {
        self.tutor_dir().join("tutor.db")
    }

    /// Ensure the .tutor directory exists.
    pub fn ensure_tutor_dir(&self) -> AppResult<()> {
        let dir = self.tutor_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .tutor directory: {}", e))
            })?;
        }
        Ok(())
    }
}

/// Source of operator-controlled settings (admin-set model, store name).
pub trait SettingsProvider: Send + Sync {
    /// Return the persisted value for `key`, if any.
    fn setting(&self, key: &str) -> Option<String>;
}

/// Settings provider backed by a plain map. Used when no store is attached.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SettingsProvider for StaticSettings {
    fn setting(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Resolve one setting: override, then persisted setting, then environment, then default.
///
/// Blank values at any tier are skipped.
pub fn resolve_setting(
    override_value: Option<&str>,
    provider: &dyn SettingsProvider,
    key: &str,
    env_value: Option<&str>,
    default: Option<&str>,
) -> Option<String> {
    let non_blank = |v: &str| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    };

    override_value
        .and_then(non_blank)
        .or_else(|| provider.setting(key).as_deref().and_then(non_blank))
        .or_else(|| env_value.and_then(non_blank))
        .or_else(|| default.and_then(non_blank))
}

/// Normalize a store identifier to a `fileSearchStores/...` resource path.
pub fn normalize_store_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains('/') {
        trimmed.to_string()
    } else {
        format!("fileSearchStores/{}", trimmed)
    }
}

/// Generation settings resolved once per request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub api_key: Option<String>,
    pub store_name: Option<String>,
    pub retrieval_model: String,
    pub greeting_model: String,
}

impl GenerationSettings {
    /// Resolve every generation setting against the given provider.
    pub fn resolve(config: &AppConfig, provider: &dyn SettingsProvider) -> Self {
        let env = &config.env;

        let store_name = resolve_setting(
            None,
            provider,
            SETTING_STORE_NAME,
            env.store_name.as_deref(),
            None,
        )
        .map(|s| normalize_store_name(&s))
        .filter(|s| !s.is_empty());

        let retrieval_model = resolve_setting(
            config.model_override.as_deref(),
            provider,
            SETTING_RETRIEVAL_MODEL,
            env.retrieval_model.as_deref(),
            Some(DEFAULT_MODEL),
        )
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let generic_model = resolve_setting(
            None,
            provider,
            SETTING_MODEL,
            env.model.as_deref(),
            Some(DEFAULT_MODEL),
        );
        let greeting_model = resolve_setting(
            None,
            provider,
            SETTING_GREETING_MODEL,
            env.greeting_model.as_deref(),
            generic_model.as_deref(),
        )
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self {
            api_key: env.api_key.clone(),
            store_name,
            retrieval_model,
            greeting_model,
        }
    }

    /// Fail with a configuration error when the credential or the store is missing.
    pub fn require_retrieval(&self) -> AppResult<(&str, &str)> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Config("Missing GEMINI_API_KEY".to_string()))?;
        let store = self
            .store_name
            .as_deref()
            .ok_or_else(|| AppError::Config("Missing FILE_SEARCH_STORE_NAME".to_string()))?;
        Ok((key, store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.generation.answer_max_output_tokens, 1500);
        assert_eq!(config.generation.greeting_max_output_tokens, 360);
        assert!(config.model_override.is_none());
        assert!(!config.verbose);
    }

    #[test]
    fn test_tutor_dir() {
        let config = AppConfig::default();
        assert!(config.tutor_dir().ends_with(".tutor"));
        assert!(config.database_path().ends_with(".tutor/tutor.db"));
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default().with_overrides(
            None,
            None,
            Some("models/gemini-2.5-pro".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(config.model_override.as_deref(), Some("models/gemini-2.5-pro"));
        assert!(config.verbose);
        assert_eq!(config.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml_sections() {
        let yaml = r#"
generation:
  answerMaxOutputTokens: 900
grounding:
  minCoverage: 0.1
  rescueTopKFloor: 30
logging:
  level: warn
  color: false
"#;
        let merged = AppConfig::default().merge_yaml(yaml).unwrap();
        assert_eq!(merged.generation.answer_max_output_tokens, 900);
        assert_eq!(merged.generation.greeting_max_output_tokens, 360);
        assert_eq!(merged.grounding.min_coverage, Some(0.1));
        assert_eq!(merged.grounding.rescue_top_k_floor, Some(30));
        assert_eq!(merged.grounding.selection_margin, None);
        assert_eq!(merged.log_level.as_deref(), Some("warn"));
        assert!(merged.no_color);
    }

    #[test]
    fn test_merge_yaml_rejects_garbage() {
        assert!(AppConfig::default().merge_yaml("grounding: [1, 2").is_err());
    }

    #[test]
    fn test_resolve_setting_order() {
        let provider = StaticSettings::new().with("k", "persisted");

        assert_eq!(
            resolve_setting(Some("forced"), &provider, "k", Some("env"), Some("d")).as_deref(),
            Some("forced")
        );
        assert_eq!(
            resolve_setting(None, &provider, "k", Some("env"), Some("d")).as_deref(),
            Some("persisted")
        );
        assert_eq!(
            resolve_setting(None, &StaticSettings::new(), "k", Some("env"), Some("d")).as_deref(),
            Some("env")
        );
        assert_eq!(
            resolve_setting(None, &StaticSettings::new(), "k", None, Some("d")).as_deref(),
            Some("d")
        );
        assert_eq!(resolve_setting(Some("  "), &StaticSettings::new(), "k", None, None), None);
    }

    #[test]
    fn test_normalize_store_name() {
        assert_eq!(normalize_store_name("abc"), "fileSearchStores/abc");
        assert_eq!(normalize_store_name(" fileSearchStores/abc "), "fileSearchStores/abc");
        assert_eq!(normalize_store_name("projects/x/stores/y"), "projects/x/stores/y");
        assert_eq!(normalize_store_name("  "), "");
    }

    #[test]
    fn test_generation_settings_greeting_falls_back_to_generic_model() {
        let mut config = AppConfig::default();
        config.env.model = Some("models/env-generic".to_string());
        let provider = StaticSettings::new().with(SETTING_STORE_NAME, "course");

        let settings = GenerationSettings::resolve(&config, &provider);
        assert_eq!(settings.greeting_model, "models/env-generic");
        assert_eq!(settings.retrieval_model, DEFAULT_MODEL);
        assert_eq!(settings.store_name.as_deref(), Some("fileSearchStores/course"));
    }

    #[test]
    fn test_require_retrieval_reports_missing_key_first() {
        let settings = GenerationSettings {
            api_key: None,
            store_name: None,
            retrieval_model: DEFAULT_MODEL.to_string(),
            greeting_model: DEFAULT_MODEL.to_string(),
        };
        let err = settings.require_retrieval().unwrap_err();
        assert!(err.to_string().contains("Missing GEMINI_API_KEY"));
    }
}
