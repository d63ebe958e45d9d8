//! Best-effort parallel feature extraction.

use crossbeam::channel::unbounded;
use rayon::ThreadPoolBuilder;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::audio::mel::mel_db;
use crate::config::{ExtractConfig, MelConfig};
use crate::error::{ExtractError, Result, panic_message};
use crate::types::{AudioBuffer, BufferCollection, FeatureCollection, FeatureEntry, FeatureMatrix};

/// A buffer that produced no features, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub index: usize,
    pub source: PathBuf,
    pub error: ExtractError,
}

#[derive(Debug, Default)]
pub struct Extraction {
    /// In completion order.
    pub features: FeatureCollection,
    pub failed: Vec<FailedItem>,
}

/// Compute features for every buffer, one task per buffer on a pool of
/// `config.extract_workers` threads.
///
/// Results are gathered as tasks finish, so `features` is in completion
/// order. A failing buffer (error or panic) is logged and reported in
/// `failed`; the rest of the batch is unaffected.
pub fn extract_features(buffers: &BufferCollection, config: &ExtractConfig) -> Result<Extraction> {
    extract_with(buffers, config, mel_db)
}

fn extract_with<F>(
    buffers: &BufferCollection,
    config: &ExtractConfig,
    transform: F,
) -> Result<Extraction>
where
    F: Fn(&AudioBuffer, &MelConfig) -> Result<FeatureMatrix, ExtractError> + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.extract_workers)
        .thread_name(|i| format!("melcache-extract-{i}"))
        .build()?;

    tracing::info!(
        "extracting features for {} buffers on {} workers",
        buffers.len(),
        config.extract_workers
    );

    let mel = &config.mel;
    let transform = &transform;
    let extraction = pool.in_place_scope(|scope| {
        let (tx, rx) = unbounded();
        for entry in buffers {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = extract_isolated(transform, &entry.buffer, mel);
                // The receiver outlives every task in this scope.
                let _ = tx.send((entry, result));
            });
        }
        drop(tx);

        let mut extraction = Extraction {
            features: Vec::with_capacity(buffers.len()),
            failed: Vec::new(),
        };
        for (entry, result) in rx {
            match result {
                Ok(features) => {
                    tracing::debug!(
                        "features for {}: {:?}",
                        entry.source.display(),
                        features.dim()
                    );
                    extraction.features.push(FeatureEntry {
                        index: entry.index,
                        source: entry.source.clone(),
                        features,
                    });
                }
                Err(error) => {
                    tracing::error!(
                        "feature extraction failed for {}: {error}",
                        entry.source.display()
                    );
                    extraction.failed.push(FailedItem {
                        index: entry.index,
                        source: entry.source.clone(),
                        error,
                    });
                }
            }
        }
        extraction
    });

    tracing::info!(
        "extracted {} feature matrices ({} failed)",
        extraction.features.len(),
        extraction.failed.len()
    );
    Ok(extraction)
}

fn extract_isolated<F>(
    transform: &F,
    buffer: &AudioBuffer,
    mel: &MelConfig,
) -> Result<FeatureMatrix, ExtractError>
where
    F: Fn(&AudioBuffer, &MelConfig) -> Result<FeatureMatrix, ExtractError>,
{
    panic::catch_unwind(AssertUnwindSafe(|| transform(buffer, mel)))
        .unwrap_or_else(|payload| Err(ExtractError::Panicked(panic_message(payload.as_ref()))))
}
