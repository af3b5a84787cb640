//! Output configuration supplied by the settings layer
//!
//! The backend never reads ambient state: a value of [`OutputConfig`] is passed
//! to every `open` call.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::ExclusiveMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// User preferences consumed by the output backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Stereo instead of 7.1 output
    pub downmix_to_2ch: bool,
    /// Request exclusive access to the endpoint
    pub exclusive_mode: bool,
    /// Friendly name of the endpoint to use; empty or absent means the default endpoint
    pub preferred_audio_device: Option<String>,
}

impl OutputConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load the config, falling back to defaults when the file is missing or broken
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("[WASAPI] {} ({}), using defaults", e, path.display());
                Self::default()
            }
        }
    }

    /// Device name to resolve at open, if one is set
    pub fn preferred_device(&self) -> Option<&str> {
        self.preferred_audio_device
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    pub fn share_mode(&self) -> ExclusiveMode {
        if self.exclusive_mode {
            ExclusiveMode::Exclusive
        } else {
            ExclusiveMode::Shared
        }
    }
}
