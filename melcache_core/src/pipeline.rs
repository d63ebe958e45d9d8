//! Load-then-extract pipeline with a cache check in front of each stage.
//!
//! Stage 1 produces the [`BufferCollection`]: loaded whole from the buffer
//! cache, or discovered + decoded and then saved. Stage 2 runs only when no
//! feature artifact exists for the run; an existing artifact is trusted as is
//! and left untouched. Features are only ever extracted from a fully
//! materialized buffer collection.

use std::path::PathBuf;

use crate::cache::{BufferCache, CacheLookup, FeatureCache};
use crate::config::PipelineConfig;
use crate::discover::discover_audio_files;
use crate::error::Result;
use crate::features::{FailedItem, extract_features};
use crate::loader::load_buffers;
use crate::types::{BufferCollection, RunId};

#[derive(Debug, Clone, PartialEq)]
pub enum BufferStage {
    /// Loaded from an existing artifact; no decoding happened.
    Cached { path: PathBuf, buffers: usize },
    /// Decoded from the source tree and written to `path`.
    Decoded {
        path: PathBuf,
        discovered: usize,
        decoded: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureStage {
    /// A feature artifact already existed; extraction was skipped.
    AlreadyCached(PathBuf),
    /// Features were extracted and written to `path`.
    Extracted {
        path: PathBuf,
        extracted: usize,
        failed: Vec<FailedItem>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: RunId,
    pub buffers: BufferStage,
    pub features: FeatureStage,
}

/// Run both stages for `config.run_id`.
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    config.validate()?;
    tracing::info!(
        "run {} over {} (cache dir {})",
        config.run_id,
        config.root.display(),
        config.cache_dir.display()
    );

    let (buffers, buffer_stage) = ensure_buffers(config)?;
    let feature_stage = ensure_features(config, &buffers)?;

    tracing::info!("process finished");
    Ok(RunReport {
        run_id: config.run_id.clone(),
        buffers: buffer_stage,
        features: feature_stage,
    })
}

/// Stage 1: buffer cache hit, or discover + decode + save.
pub fn ensure_buffers(config: &PipelineConfig) -> Result<(BufferCollection, BufferStage)> {
    let cache = BufferCache::new(&config.cache_dir);

    if let CacheLookup::Hit(buffers) = cache.load(&config.run_id)? {
        let stage = BufferStage::Cached {
            path: cache.path(&config.run_id),
            buffers: buffers.len(),
        };
        return Ok((buffers, stage));
    }

    let paths = discover_audio_files(&config.root)?;
    let buffers = load_buffers(&paths, &config.loader)?;
    let path = cache.save(&buffers, &config.run_id)?;

    let stage = BufferStage::Decoded {
        path,
        discovered: paths.len(),
        decoded: buffers.len(),
    };
    Ok((buffers, stage))
}

/// Stage 2: skip when the feature artifact exists, else extract + save.
pub fn ensure_features(config: &PipelineConfig, buffers: &BufferCollection) -> Result<FeatureStage> {
    let cache = FeatureCache::new(&config.cache_dir);
    let path = cache.path(&config.run_id);

    if cache.exists(&config.run_id) {
        tracing::info!("features already cached at {}, skipping extraction", path.display());
        return Ok(FeatureStage::AlreadyCached(path));
    }

    let extraction = extract_features(buffers, &config.extract)?;
    let path = cache.save(&extraction.features, &config.run_id)?;

    Ok(FeatureStage::Extracted {
        path,
        extracted: extraction.features.len(),
        failed: extraction.failed,
    })
}

/// Stage 2 alone, fed from the buffer cache of an earlier run.
///
/// Returns `None` when that run left no buffer artifact.
pub fn extract_cached(config: &PipelineConfig) -> Result<Option<FeatureStage>> {
    config.validate()?;
    match BufferCache::new(&config.cache_dir).load(&config.run_id)? {
        CacheLookup::Hit(buffers) => ensure_features(config, &buffers).map(Some),
        CacheLookup::Miss => Ok(None),
    }
}
