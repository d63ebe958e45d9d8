use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to walk directory tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to decode {path}: {source:#}")]
    Decode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("cache artifact {path}: {reason}")]
    Cache { path: PathBuf, reason: String },

    #[error("cache I/O on {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache encoding for {path}: {source}")]
    CacheEncoding {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Why a single buffer produced no features. Never aborts the batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("buffer is empty")]
    EmptySignal,

    #[error("audio buffer is not finite everywhere (first bad sample at {0})")]
    NonFinite(usize),

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    #[error("mel band edges out of order for this sample rate: f_min {f_min} Hz, f_max {f_max} Hz")]
    InvalidBandEdges { f_min: f32, f_max: f32 },

    #[error("fft failed: {0}")]
    Fft(String),

    #[error("extraction task panicked: {0}")]
    Panicked(String),
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
