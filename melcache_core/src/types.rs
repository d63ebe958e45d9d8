use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Mono PCM samples together with the rate they were sampled at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Mel power spectrogram in decibels, shaped `(n_mels, n_frames)`.
pub type FeatureMatrix = Array2<f32>;

/// One decoded file. `index` is the file's position in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferEntry {
    pub index: usize,
    pub source: PathBuf,
    pub buffer: AudioBuffer,
}

/// Features of one buffer, keyed back to the buffer they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub index: usize,
    pub source: PathBuf,
    pub features: FeatureMatrix,
}

/// Decoded buffers in discovery order.
pub type BufferCollection = Vec<BufferEntry>;

/// Extracted features in completion order. Join on `index` or `source`,
/// never on position.
pub type FeatureCollection = Vec<FeatureEntry>;

/// Names the cache artifacts of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<folder name>_<YYYYMMDD-HHMMSS>`, the naming used for fresh runs.
    pub fn from_folder_and_timestamp(folder_name: &str, timestamp: &str) -> Self {
        Self(format!("{folder_name}_{timestamp}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn buffers_file_name(&self) -> String {
        format!("{}.cache", self.0)
    }

    pub fn features_file_name(&self) -> String {
        format!("{}features_.cache", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
