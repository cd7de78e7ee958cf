//! Configuration for the Hearth agent
//!
//! Settings load from a TOML file under the project data directory and can
//! be overridden per field through `HEARTH_*` environment variables.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::Result;
use crate::runtime::PipelineSettings;
use crate::state::ComposerSettings;

/// Hearth agent configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Who the agent is on the platform
    pub agent: AgentSettings,

    /// Chat platform API access
    pub api: ApiSettings,

    /// Language-model endpoints
    pub llm: LlmSettings,

    /// Storage locations
    pub storage: StorageSettings,

    /// Ingestion pipeline knobs
    pub pipeline: PipelineSettings,

    /// Context composition limits
    pub composer: ComposerSettings,
}

/// Agent identity settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Display name used in prompts and logs
    pub name: String,

    /// Platform identity (wallet address or agent identifier)
    pub identity: String,

    /// Hex-encoded Ed25519 public key for signed operator commands
    pub operator_public_key: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: "Hearth".to_string(),
            identity: "agent-hearth".to_string(),
            operator_public_key: None,
        }
    }
}

/// Chat platform API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the chat platform REST API
    pub base_url: String,

    /// Bearer token for authenticated endpoints
    pub token: Option<SecretString>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8790".to_string(),
            token: None,
        }
    }
}

/// Language-model endpoint settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of an `OpenAI`-compatible API
    pub api_url: String,

    /// API key for the model endpoint
    pub api_key: Option<SecretString>,

    /// Chat completion model identifier
    pub model: String,

    /// Embedding model identifier
    pub embed_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Data directory override; defaults to the platform project dir
    pub data_dir: Option<PathBuf>,
}

/// Return the project data directory, creating it if needed
///
/// Uses `~/.local/share/hearth/` on Linux.
#[must_use]
pub fn data_dir() -> PathBuf {
    let dir = directories::ProjectDirs::from("dev", "hearth", "hearth")
        .map_or_else(|| PathBuf::from(".hearth"), |d| d.data_dir().to_path_buf());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "failed to create data directory");
    }

    dir
}

impl Config {
    /// Load configuration from an explicit path, or from `hearth.toml` in
    /// the data directory, falling back to defaults when neither exists.
    ///
    /// `HEARTH_*` environment variables override individual fields after
    /// the file is read.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or
    /// parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => {
                let default_path = data_dir().join("hearth.toml");
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Resolve the effective data directory
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(data_dir)
    }

    /// Apply `HEARTH_*` environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("HEARTH_AGENT_NAME") {
            self.agent.name = name;
        }
        if let Ok(identity) = std::env::var("HEARTH_AGENT_IDENTITY") {
            self.agent.identity = identity;
        }
        if let Ok(key) = std::env::var("HEARTH_OPERATOR_KEY") {
            self.agent.operator_public_key = Some(key);
        }
        if let Ok(url) = std::env::var("HEARTH_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(token) = std::env::var("HEARTH_API_TOKEN") {
            self.api.token = Some(SecretString::from(token));
        }
        if let Ok(url) = std::env::var("HEARTH_LLM_URL") {
            self.llm.api_url = url;
        }
        if let Ok(key) =
            std::env::var("HEARTH_LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            self.llm.api_key = Some(SecretString::from(key));
        }
        if let Ok(model) = std::env::var("HEARTH_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("HEARTH_EMBED_MODEL") {
            self.llm.embed_model = model;
        }
        if let Ok(dir) = std::env::var("HEARTH_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
    }
}
