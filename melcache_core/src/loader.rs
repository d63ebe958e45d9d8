//! Parallel decode of discovered files into a [`BufferCollection`].

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::audio::decoder::decode_file;
use crate::config::LoaderConfig;
use crate::error::{Error, Result, panic_message};
use crate::types::{AudioBuffer, BufferCollection, BufferEntry};

/// Decode every path on a pool of `config.decode_workers` threads.
///
/// Entries keep the order of `paths`. A file that fails to decode is logged
/// and left out, unless `config.fail_fast` is set, in which case the first
/// failure (in input order) is returned and nothing is produced.
pub fn load_buffers(paths: &[PathBuf], config: &LoaderConfig) -> Result<BufferCollection> {
    load_with(paths, config, |path, target_rate| decode_file(path, target_rate))
}

fn load_with<F>(paths: &[PathBuf], config: &LoaderConfig, decode: F) -> Result<BufferCollection>
where
    F: Fn(&Path, Option<u32>) -> anyhow::Result<AudioBuffer> + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.decode_workers)
        .thread_name(|i| format!("melcache-decode-{i}"))
        .build()?;

    tracing::info!(
        "decoding {} files on {} workers",
        paths.len(),
        config.decode_workers
    );

    let target_rate = config.target_sample_rate;
    let results: Vec<anyhow::Result<AudioBuffer>> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| decode_isolated(&decode, path, target_rate))
            .collect()
    });

    let mut buffers = Vec::with_capacity(results.len());
    let mut skipped = 0usize;

    for (index, (path, result)) in paths.iter().zip(results).enumerate() {
        match result {
            Ok(buffer) => {
                tracing::debug!(
                    "decoded {} ({} samples @ {} Hz)",
                    path.display(),
                    buffer.samples.len(),
                    buffer.sample_rate
                );
                buffers.push(BufferEntry {
                    index,
                    source: path.clone(),
                    buffer,
                });
            }
            Err(source) if config.fail_fast => {
                return Err(Error::Decode {
                    path: path.clone(),
                    source,
                });
            }
            Err(e) => {
                tracing::warn!("skipping {}: {e:#}", path.display());
                skipped += 1;
            }
        }
    }

    tracing::info!(
        "decoded {} of {} files ({} skipped)",
        buffers.len(),
        paths.len(),
        skipped
    );
    Ok(buffers)
}

/// A panicking decoder counts as a failed file, not a dead worker.
fn decode_isolated<F>(
    decode: &F,
    path: &Path,
    target_rate: Option<u32>,
) -> anyhow::Result<AudioBuffer>
where
    F: Fn(&Path, Option<u32>) -> anyhow::Result<AudioBuffer>,
{
    panic::catch_unwind(AssertUnwindSafe(|| decode(path, target_rate))).unwrap_or_else(
        |payload| {
            Err(anyhow::anyhow!(
                "decoder panicked: {}",
                panic_message(payload.as_ref())
            ))
        },
    )
}
