use serde::{Deserialize, Serialize};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Largest page the message history endpoint will serve
pub const MAX_PAGE_SIZE: u8 = 100;

/// A filesystem-based configuration store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord_token: String,
    /// Guild folders are created inside this directory
    pub output_dir: PathBuf,
    pub page_size: u8,
    /// Pause after every text channel, shared rate-limit budget
    pub channel_cooldown_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigLoadSaveError {
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("created a template at {0}, fill in `discord_token` and rerun")]
    Created(PathBuf),

    #[error("`discord_token` in {0} is empty")]
    MissingToken(PathBuf),
}

impl Config {
    /// Load a configuration file from the filesystem
    pub async fn load(path: &Path) -> Result<Self, ConfigLoadSaveError> {
        let file = tokio::fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&file)?;
        if config.discord_token.trim().is_empty() {
            return Err(ConfigLoadSaveError::MissingToken(path.to_path_buf()));
        }
        Ok(config)
    }

    /// Load the configuration, writing a template first if none exists yet
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigLoadSaveError> {
        if tokio::fs::try_exists(path).await? {
            return Self::load(path).await;
        }
        Self::default().save(path).await?;
        Err(ConfigLoadSaveError::Created(path.to_path_buf()))
    }

    /// Save the current configuration as a file to the filesystem
    pub async fn save(&self, path: &Path) -> Result<(), ConfigLoadSaveError> {
        let file = toml::to_string(&self)?;
        tokio::fs::write(path, file).await?;
        Ok(())
    }

    pub fn page_size(&self) -> u8 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn channel_cooldown(&self) -> Duration {
        Duration::from_millis(self.channel_cooldown_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            output_dir: PathBuf::from("."),
            page_size: MAX_PAGE_SIZE,
            channel_cooldown_ms: 1000,
        }
    }
}
