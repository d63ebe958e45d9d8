//! Pipeline configuration.
//!
//! Everything the pipeline needs is passed in through [`PipelineConfig`];
//! there is no process-wide state. All sections deserialize from TOML with
//! per-field defaults, so a config file only has to name what it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::RunId;

/// Decode worker count used when nothing else is configured.
pub const DEFAULT_DECODE_WORKERS: usize = 8;

/// Rate every decoded file is resampled to unless disabled.
pub const DEFAULT_TARGET_SAMPLE_RATE: u32 = 22_050;

/// Thread count matching the host's available parallelism.
pub fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub run_id: RunId,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>, run_id: RunId) -> Self {
        Self {
            root: root.into(),
            run_id,
            cache_dir: default_cache_dir(),
            loader: LoaderConfig::default(),
            extract: ExtractConfig::default(),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.run_id.as_str().is_empty() {
            return Err(Error::Config("run id must not be empty".into()));
        }
        self.loader.validate()?;
        self.extract.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub decode_workers: usize,
    /// `None` keeps every file at its native rate.
    pub target_sample_rate: Option<u32>,
    /// Abort the whole batch on the first file that fails to decode.
    pub fail_fast: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            decode_workers: DEFAULT_DECODE_WORKERS,
            target_sample_rate: Some(DEFAULT_TARGET_SAMPLE_RATE),
            fail_fast: false,
        }
    }
}

impl LoaderConfig {
    fn validate(&self) -> Result<()> {
        if self.decode_workers == 0 {
            return Err(Error::Config("decode_workers must be > 0".into()));
        }
        if self.target_sample_rate == Some(0) {
            return Err(Error::Config("target_sample_rate must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub extract_workers: usize,
    pub mel: MelConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            extract_workers: host_parallelism(),
            mel: MelConfig::default(),
        }
    }
}

impl ExtractConfig {
    fn validate(&self) -> Result<()> {
        if self.extract_workers == 0 {
            return Err(Error::Config("extract_workers must be > 0".into()));
        }
        self.mel.validate()
    }
}

/// Mel spectrogram parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelConfig {
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub f_min: f32,
    /// Upper band edge; `None` means the Nyquist frequency of each buffer.
    pub f_max: Option<f32>,
    /// Floor applied below the loudest value; `None` disables clipping.
    pub top_db: Option<f32>,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            f_min: 0.0,
            f_max: None,
            top_db: Some(80.0),
        }
    }
}

impl MelConfig {
    fn validate(&self) -> Result<()> {
        if self.n_fft < 2 {
            return Err(Error::Config("n_fft must be >= 2".into()));
        }
        if self.hop_length == 0 {
            return Err(Error::Config("hop_length must be > 0".into()));
        }
        if self.n_mels == 0 {
            return Err(Error::Config("n_mels must be > 0".into()));
        }
        if self.f_min < 0.0 || self.f_max.is_some_and(|f_max| f_max <= self.f_min) {
            return Err(Error::Config("mel band edges must satisfy 0 <= f_min < f_max".into()));
        }
        if self.top_db.is_some_and(|top_db| top_db < 0.0) {
            return Err(Error::Config("top_db must be non-negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::new("/data", RunId::new("run"));
        assert!(config.validate().is_ok());
        assert_eq!(config.loader.decode_workers, 8);
        assert_eq!(config.loader.target_sample_rate, Some(22_050));
        assert_eq!(config.extract.mel.n_mels, 128);
        assert!(config.extract.extract_workers >= 1);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = PipelineConfig::new("/data", RunId::new("run"));
        config.loader.decode_workers = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::new("/data", RunId::new("run"));
        config.extract.extract_workers = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn empty_run_id_rejected() {
        let config = PipelineConfig::new("/data", RunId::new(""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_band_edges_rejected() {
        let mut config = PipelineConfig::new("/data", RunId::new("run"));
        config.extract.mel.f_min = 4000.0;
        config.extract.mel.f_max = Some(2000.0);
        assert!(config.validate().is_err());
    }
}
