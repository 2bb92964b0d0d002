//! Configuration management for Codepilot.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (.codepilot/config.yaml)
//!
//! The configuration is workspace-centric, with all state stored in `.codepilot/`.
//! Analysis and chat components never read the environment themselves; they
//! receive the resolved values from this struct through their constructors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".codepilot";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .codepilot/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generative provider (e.g., "ollama", "gemini", "mock")
    pub provider: String,

    /// Default model identifier
    pub model: String,

    /// API key for the generative provider
    pub api_key: Option<String>,

    /// Token for the remote repository API
    pub github_token: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Provider configurations
    pub llm: Option<LlmConfig>,

    /// Analysis, retrieval and prompt budget settings
    pub analysis: AnalysisSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    #[serde(rename = "activeEmbeddingProvider")]
    pub active_embedding_provider: Option<String>,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Gemini {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        #[serde(rename = "embeddingModel")]
        embedding_model: Option<String>,
        timeout: Option<u64>,
    },
}

/// Settings that shape analysis, retrieval and prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    /// Split files into chunks; when false each file becomes one full_file item
    pub chunking: bool,

    /// Embed chunks and rank them against the question
    pub semantic_retrieval: bool,

    /// Maximum chunk size in characters
    pub chunk_size: usize,

    /// Overlap between forced windows in characters
    pub chunk_overlap: usize,

    /// File extensions taken into analysis (with leading dot)
    pub extensions: Vec<String>,

    /// Directory names skipped while listing a source
    pub ignored_dirs: Vec<String>,

    /// Files larger than this are not listed
    pub max_file_size_kb: u64,

    /// Number of retrieved chunks placed in the prompt
    pub top_n: usize,

    /// Tokens reserved for the model's answer
    pub max_output_tokens: usize,

    /// Input window of the generative model
    pub context_window: usize,

    /// Upper bound for each network call
    pub request_timeout_secs: u64,

    /// Language the model should answer in
    pub response_language: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            chunking: true,
            semantic_retrieval: true,
            chunk_size: 1000,
            chunk_overlap: 150,
            extensions: [
                ".py", ".txt", ".md", ".json", ".html", ".css", ".js", ".ts", ".rs", ".go",
                ".java", ".cpp", ".h", ".yaml", ".yml", ".pdf", ".docx",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignored_dirs: [
                "venv", ".venv", "__pycache__", ".git", ".vscode", ".idea", "node_modules",
                "build", "dist", "target", "out", "bin", "obj", "docs", "examples", "tests",
                "test", "samples", STATE_DIR,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_file_size_kb: 512,
            top_n: 30,
            max_output_tokens: 65536,
            context_window: 1_048_576,
            request_timeout_secs: 180,
            response_language: "English".to_string(),
        }
    }
}

impl AnalysisSettings {
    /// Whether a path passes the extension allow-list (case-insensitive).
    pub fn allows(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_lowercase()))
    }

    /// Tokens available for the assembled prompt.
    pub fn token_budget(&self) -> usize {
        self.context_window.saturating_sub(self.max_output_tokens)
    }

    /// Reject settings that would make the splitter or budget meaningless.
    pub fn validate(&self) -> AppResult<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_output_tokens >= self.context_window {
            return Err(AppError::Config(format!(
                "maxOutputTokens ({}) leaves no room in a context window of {}",
                self.max_output_tokens, self.context_window
            )));
        }
        Ok(())
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    analysis: Option<AnalysisSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            github_token: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            analysis: AnalysisSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `CODEPILOT_WORKSPACE`: Override workspace path
    /// - `CODEPILOT_CONFIG`: Path to config file
    /// - `CODEPILOT_PROVIDER`: Generative provider
    /// - `CODEPILOT_MODEL`: Model identifier
    /// - `CODEPILOT_API_KEY`: API key
    /// - `GITHUB_TOKEN`: Token for remote repositories
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("CODEPILOT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("CODEPILOT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.state_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("CODEPILOT_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("CODEPILOT_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("CODEPILOT_API_KEY").ok();
        config.github_token = std::env::var("GITHUB_TOKEN").ok();

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(ws) = config_file.workspace {
            if let Some(path) = ws.path {
                result.workspace = PathBuf::from(path);
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(analysis) = config_file.analysis {
            result.analysis = analysis;
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = match provider_config {
                    ProviderConfig::Gemini { model, .. } => model.clone(),
                    ProviderConfig::Ollama { model, .. } => model.clone(),
                };
            }

            result.llm = Some(llm);
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and YAML.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
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

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
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

    /// Path to the .codepilot directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(STATE_DIR)
    }

    /// Ensure the .codepilot directory exists.
    pub fn ensure_state_dir(&self) -> AppResult<()> {
        let state_dir = self.state_dir();
        if !state_dir.exists() {
            std::fs::create_dir_all(&state_dir).map_err(|e| {
                AppError::Config(format!("Failed to create {} directory: {}", STATE_DIR, e))
            })?;
        }
        Ok(())
    }

    /// SQLite file holding the persisted project context and chat history.
    pub fn store_path(&self) -> PathBuf {
        self.state_dir().join("context.db")
    }

    /// Directory of saved instruction templates.
    pub fn templates_dir(&self) -> PathBuf {
        self.state_dir().join("templates")
    }

    /// Append-only log file.
    pub fn log_file(&self) -> PathBuf {
        self.state_dir().join("codepilot.log")
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.llm.as_ref().and_then(|llm| llm.providers.get(provider))
    }

    /// Provider used for embeddings; defaults to the generative provider.
    pub fn embedding_provider(&self) -> String {
        self.llm
            .as_ref()
            .and_then(|llm| llm.active_embedding_provider.clone())
            .unwrap_or_else(|| self.provider.clone())
    }

    /// Embedding model configured for a provider, if any.
    pub fn embedding_model(&self, provider: &str) -> Option<String> {
        match self.get_provider_config(provider)? {
            ProviderConfig::Gemini { embedding_model, .. }
            | ProviderConfig::Ollama { embedding_model, .. } => embedding_model.clone(),
        }
    }

    /// Custom endpoint configured for a provider, if any.
    pub fn endpoint(&self, provider: &str) -> Option<String> {
        match self.get_provider_config(provider)? {
            ProviderConfig::Gemini { endpoint, .. } => endpoint.clone(),
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint.clone()),
        }
    }

    /// Resolve API key from `CODEPILOT_API_KEY` or the provider's key variable.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        match self.get_provider_config(provider) {
            Some(ProviderConfig::Gemini { api_key_env, .. }) => std::env::var(api_key_env).ok(),
            _ if provider == "gemini" => std::env::var("GEMINI_API_KEY").ok(),
            _ => None,
        }
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let provider = &self.provider;
        let known_providers = ["ollama", "gemini", "mock"];

        if !known_providers.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                known_providers.join(", ")
            )));
        }

        if provider == "gemini" && self.resolve_api_key(provider).is_none() {
            return Err(AppError::Config(
                "Gemini provider requires an API key (CODEPILOT_API_KEY or apiKeyEnv)".into(),
            ));
        }

        self.analysis.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(!config.verbose);
        assert_eq!(config.analysis.chunk_size, 1000);
        assert_eq!(config.analysis.chunk_overlap, 150);
        assert_eq!(config.analysis.top_n, 30);
    }

    #[test]
    fn test_state_paths() {
        let config = AppConfig::default();
        assert!(config.state_dir().ends_with(STATE_DIR));
        assert!(config.store_path().ends_with("context.db"));
        assert!(config.templates_dir().ends_with("templates"));
    }

    #[test]
    fn test_with_overrides() {
        let overridden = AppConfig::default().with_overrides(
            None,
            None,
            Some("gemini".to_string()),
            Some("gemini-1.5-flash".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "gemini");
        assert_eq!(overridden.model, "gemini-1.5-flash");
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_mock() {
        let mut config = AppConfig::default();
        config.provider = "mock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_analysis_settings_validation() {
        let mut settings = AnalysisSettings::default();
        assert!(settings.validate().is_ok());

        settings.chunk_overlap = settings.chunk_size;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_extension_allow_list() {
        let settings = AnalysisSettings::default();
        assert!(settings.allows("src/main.py"));
        assert!(settings.allows("README.MD"));
        assert!(!settings.allows("image.png"));
    }

    #[test]
    fn test_token_budget() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.token_budget(), 1_048_576 - 65536);
    }

    #[test]
    fn test_merge_yaml_analysis_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: qwen2.5-coder
      embeddingModel: nomic-embed-text
analysis:
  chunkSize: 800
  semanticRetrieval: false
logging:
  level: warn
"#,
        )
        .unwrap();

        let merged = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(merged.model, "qwen2.5-coder");
        assert_eq!(merged.analysis.chunk_size, 800);
        assert!(!merged.analysis.semantic_retrieval);
        assert_eq!(merged.analysis.chunk_overlap, 150);
        assert_eq!(merged.log_level, Some("warn".to_string()));
        assert_eq!(
            merged.embedding_model("ollama"),
            Some("nomic-embed-text".to_string())
        );
    }
}
