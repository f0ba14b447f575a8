use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use sqlagent_graph::ExecutionConfig;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "sqlagent.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable `{var}` holding the LLM API key is not set")]
    MissingApiKey { var: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Everything the binary needs, read once from `sqlagent.toml` and then
/// adjusted by command-line flags.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub database: DatabaseSettings,
    pub agent: AgentSettings,
    pub checkpoint: CheckpointSettings,
    pub batch: BatchSettings,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAi,
    Cohere,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Name of the environment variable that holds the API key.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            base_url: None,
            model: "llama3.1".to_string(),
            temperature: 0.0,
            api_key_env: None,
            timeout_secs: 120,
        }
    }
}

impl LlmSettings {
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.clone();
        }
        match self.provider {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::OpenAi => "https://api.openai.com",
            LlmProvider::Cohere => sqlagent_llm::COHERE_BASE_URL,
        }
        .to_string()
    }

    pub fn api_key_var(&self) -> Option<&str> {
        match (&self.api_key_env, self.provider) {
            (Some(var), _) => Some(var.as_str()),
            (None, LlmProvider::Ollama) => None,
            (None, LlmProvider::OpenAi) => Some("OPENAI_API_KEY"),
            (None, LlmProvider::Cohere) => Some("COHERE_API_KEY"),
        }
    }

    /// Reads the key from the configured environment variable. Hosted
    /// providers require one; a local Ollama may run without.
    pub fn api_key(&self) -> Result<Option<SecretString>, ConfigError> {
        let Some(var) = self.api_key_var() else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Ok(Some(SecretString::new(value))),
            _ if self.provider == LlmProvider::Ollama => Ok(None),
            _ => Err(ConfigError::MissingApiKey {
                var: var.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub url: String,
    pub sample_rows: u32,
    /// All tables when empty.
    pub include_tables: Vec<String>,
    pub init_statements: Vec<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://sqlagent.db".to_string(),
            sample_rows: 3,
            include_tables: Vec::new(),
            init_statements: Vec::new(),
            max_connections: 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub max_retries: u32,
    pub require_approval: bool,
    /// 0 disables the guard.
    pub max_steps: usize,
    pub system_preamble: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let defaults = ExecutionConfig::default();
        Self {
            max_retries: defaults.max_retries,
            require_approval: defaults.require_approval,
            max_steps: defaults.max_steps.unwrap_or(0),
            system_preamble: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Sqlite,
    File,
    Memory,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointSettings {
    pub backend: CheckpointBackend,
    /// Database file for `sqlite`, directory for `file`.
    pub path: PathBuf,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Sqlite,
            path: PathBuf::from("sqlagent_checkpoints.sqlite"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub pause_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("questions.txt"),
            output: PathBuf::from("answers.txt"),
            pause_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Loads `path`, which must exist, or `sqlagent.toml` when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::MissingConfigFile(path.to_path_buf()))
            }
            Some(path) => Self::read(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Validation("llm.model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation("llm.timeout_secs must be positive".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".into(),
            ));
        }
        self.execution_config()
            .validate()
            .map_err(|message| ConfigError::Validation(format!("agent: {message}")))?;
        Ok(())
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_retries: self.agent.max_retries,
            require_approval: self.agent.require_approval,
            max_steps: (self.agent.max_steps > 0).then_some(self.agent.max_steps),
        }
    }
}
