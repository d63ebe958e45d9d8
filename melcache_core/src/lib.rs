//! Batch decode of an audio tree into cached sample buffers, and cached
//! per-file mel spectrogram features computed from them.
//!
//! - [`discover`]: recursive `.wav` / `.mp3` discovery
//! - [`loader`]: parallel decode (symphonia + rubato)
//! - [`features`]: parallel, failure-tolerant mel dB extraction
//! - [`cache`]: bincode artifacts keyed by run id
//! - [`pipeline`]: the two cached stages end to end

pub mod audio;
pub mod cache;
pub mod config;
pub mod discover;
pub mod error;
pub mod features;
pub mod loader;
pub mod pipeline;
pub mod types;

pub use config::{ExtractConfig, LoaderConfig, MelConfig, PipelineConfig};
pub use error::{Error, ExtractError, Result};
pub use pipeline::{BufferStage, FeatureStage, RunReport};
pub use types::{
    AudioBuffer, BufferCollection, BufferEntry, FeatureCollection, FeatureEntry, FeatureMatrix,
    RunId,
};
