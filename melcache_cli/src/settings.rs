//! Optional TOML settings file.
//!
//! ```toml
//! cache_dir = "caches"
//!
//! [loader]
//! decode_workers = 4
//! target_sample_rate = 16000
//!
//! [extract.mel]
//! n_mels = 64
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use melcache_core::{ExtractConfig, LoaderConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub cache_dir: Option<PathBuf>,
    pub loader: LoaderConfig,
    pub extract: ExtractConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
