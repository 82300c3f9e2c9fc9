use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ai::retrieval::DEFAULT_TOP_K;
use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_EMBEDDING_MODEL: &str = "bge-m3";
const DEFAULT_LOCAL_MODEL: &str = "llama3.2";
const DEFAULT_CLOUD_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Embedding and completion settings. Everything here is threaded into
/// the component constructors explicitly; nothing reads it ambiently.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    /// Embedding model served by the local daemon.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Base URL of the local model daemon.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Route completions to the cloud provider instead of the local daemon.
    #[serde(default)]
    pub use_cloud: bool,

    /// Completion model for the local daemon.
    #[serde(default = "default_local_model")]
    pub local_model: String,

    /// Completion model for the cloud provider.
    #[serde(default = "default_cloud_model")]
    pub cloud_model: String,

    /// Cloud provider credential; `WEEKLY_OPENROUTER_KEY` overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Result count for semantic recall.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Index changed summary/journal blocks in the background while the
    /// interactive journal is open.
    #[serde(default)]
    pub auto_index: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            use_cloud: false,
            local_model: DEFAULT_LOCAL_MODEL.to_string(),
            cloud_model: DEFAULT_CLOUD_MODEL.to_string(),
            openrouter_api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            auto_index: false,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_cloud_model() -> String {
    DEFAULT_CLOUD_MODEL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Remote store connection. Sync stays disabled until a URL is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Public (anon) API key sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn load_with(base_path: &Path) -> Result<Self> {
        let store = BackendLocal::new(base_path)
            .context("failed to create application base directory")?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("creating default config at {}", base_path.display());
            let default_yaml = serde_yml::to_string(&Self::default())?;
            store
                .write(CONFIG_FILE, default_yaml.as_bytes())
                .context("failed to write default config")?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .context("config file is not valid utf8")?;
        let mut config: Self =
            serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let store = BackendLocal::new(&self.base_path)
            .context("failed to create application base directory")?;

        let config_str = serde_yml::to_string(&self)?;
        store
            .write(CONFIG_FILE, config_str.as_bytes())
            .context("failed to write config")?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.ai.ollama_url)
            .with_context(|| format!("ai.ollama_url {:?} is not a valid URL", self.ai.ollama_url))?;

        if let Some(url) = &self.sync.url {
            Url::parse(url).with_context(|| format!("sync.url {url:?} is not a valid URL"))?;
        }

        if self.ai.embedding_model.trim().is_empty() {
            bail!("ai.embedding_model must not be empty");
        }

        if !(0.0..=2.0).contains(&self.ai.temperature) {
            bail!(
                "ai.temperature must be between 0.0 and 2.0, got {}",
                self.ai.temperature
            );
        }

        if self.ai.top_k == 0 {
            bail!("ai.top_k must be greater than 0");
        }

        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Environment wins over the persisted credential.
    pub fn openrouter_key(&self) -> Option<String> {
        std::env::var("WEEKLY_OPENROUTER_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| self.ai.openrouter_api_key.clone())
    }
}

/// `WEEKLY_BASE_PATH` if set, otherwise `~/.local/share/weekly`.
pub fn resolve_base_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("WEEKLY_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/weekly"))
}
