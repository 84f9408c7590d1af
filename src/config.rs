use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn default_bot_name() -> String {
    "memobot".to_string()
}

fn default_persona() -> String {
    "You are memobot, a friendly personal assistant. Answer concisely and \
     remember what the user tells you."
        .to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_base_url() -> String {
    "https://api.deepseek.com".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Fallback only; the DEEPSEEK_API_KEY environment variable wins.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            bot_name: default_bot_name(),
            persona: default_persona(),
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
        }
    }

    /// Load the config file, writing the defaults on first run so the user
    /// has a file to edit.
    pub fn load_or_init() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            let config = Self::new();
            config.save()?;
            return Ok(config);
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// API key resolution: environment first, config file second.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .or_else(|| self.api_key.clone())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("memobot").join("config.json"))
    }
}

/// Directory holding the per-bot conversation files and the log file.
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;

    Ok(data_dir.join("memobot"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_in_defaults() {
        let config: Config = serde_json::from_str(r#"{"bot_name":"custom"}"#).unwrap();
        assert_eq!(config.bot_name, "custom");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.base_url, "https://api.deepseek.com");
        assert!(config.api_key.is_none());
    }
}
