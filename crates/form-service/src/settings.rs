//! Generator settings persisted next to the form store.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const SETTINGS_FILE: &str = "settings.json";

pub const OLLAMA_BASE_URL: &str = "http://127.0.0.1:11434/v1";
pub const OLLAMA_MODEL: &str = "llama3";
pub const OLLAMA_API_KEY: &str = "ollama";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o";

pub const ENV_PROVIDER: &str = "FORMSMITH_PROVIDER";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "FORMSMITH_BASE_URL";
pub const ENV_MODEL: &str = "FORMSMITH_MODEL";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("unknown provider '{0}' (expected auto, openai or ollama)")]
    UnknownProvider(String),
    #[error("unknown setting '{0}' (expected provider, api_key, base_url or model)")]
    UnknownKey(String),
}

/// Which backend drafts forms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI when an API key is known, local Ollama otherwise.
    #[default]
    Auto,
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl FromStr for Provider {
    type Err = SettingsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Provider::Auto),
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => Err(SettingsError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Auto => "auto",
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
        })
    }
}

/// User-editable generator settings. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Settings {
    pub fn path_in(dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(SETTINGS_FILE)
    }

    /// Loads `settings.json`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body = serde_json::to_string_pretty(self).map_err(SettingsError::Encode)?;
        fs::write(path, body).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup(ENV_PROVIDER) {
            self.provider = provider.parse()?;
        }
        if let Some(key) = lookup(ENV_API_KEY)
            && non_blank(&self.api_key).is_none()
        {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = Some(url);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.model = Some(model);
        }
        Ok(())
    }

    /// Sets one key by name, as used by `formsmith settings set`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let value = Some(value.to_string()).filter(|value| !value.trim().is_empty());
        match key {
            "provider" => self.provider = value.as_deref().unwrap_or("auto").parse()?,
            "api_key" | "api-key" => self.api_key = value,
            "base_url" | "base-url" => self.base_url = value,
            "model" => self.model = value,
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Chooses the concrete endpoint, model and key to talk to.
    pub fn resolve(&self) -> ResolvedProvider {
        let base_url = non_blank(&self.base_url);
        let model = non_blank(&self.model);
        let api_key = non_blank(&self.api_key);

        let resolved = match (self.provider, api_key) {
            (Provider::Ollama, _) => ResolvedProvider {
                provider: Provider::Ollama,
                base_url: base_url.unwrap_or(OLLAMA_BASE_URL).to_string(),
                model: model.unwrap_or(OLLAMA_MODEL).to_string(),
                api_key: OLLAMA_API_KEY.to_string(),
            },
            (_, Some(key)) => ResolvedProvider {
                provider: Provider::OpenAi,
                base_url: base_url.unwrap_or(OPENAI_BASE_URL).to_string(),
                model: model.unwrap_or(OPENAI_MODEL).to_string(),
                api_key: key.to_string(),
            },
            (_, None) => ResolvedProvider {
                provider: Provider::Ollama,
                base_url: OLLAMA_BASE_URL.to_string(),
                model: OLLAMA_MODEL.to_string(),
                api_key: OLLAMA_API_KEY.to_string(),
            },
        };
        debug!(
            configured = %self.provider,
            provider = %resolved.provider,
            model = %resolved.model,
            "resolved generator"
        );
        resolved
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// Effective connection parameters. `provider` is never `Auto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProvider {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl ResolvedProvider {
    /// Root of the Ollama native API, i.e. the base URL without `/v1`.
    pub fn native_base_url(&self) -> &str {
        let trimmed = self.base_url.trim_end_matches('/');
        trimmed.strip_suffix("/v1").unwrap_or(trimmed)
    }
}
