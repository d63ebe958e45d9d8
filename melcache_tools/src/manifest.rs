use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use melcache_core::cache::{BufferCache, FeatureCache};
use melcache_core::{BufferCollection, FeatureCollection, FeatureEntry, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Jsonl,
    Csv,
}

/// One row per cached buffer, joined to its features by index.
#[derive(Debug, Serialize)]
pub struct ManifestLine {
    pub index: usize,
    pub source: String,
    pub sample_rate: u32,
    pub n_samples: usize,
    pub duration_secs: f64,
    pub n_mels: Option<usize>,
    pub n_frames: Option<usize>,
    pub db_min: Option<f32>,
    pub db_max: Option<f32>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub rows: usize,
    pub with_features: usize,
    pub without_features: usize,
}

pub fn build_lines(buffers: &BufferCollection, features: &FeatureCollection) -> Vec<ManifestLine> {
    let by_index: HashMap<usize, &FeatureEntry> =
        features.iter().map(|f| (f.index, f)).collect();

    buffers
        .iter()
        .map(|entry| {
            let feature = by_index.get(&entry.index);
            let db_min = feature.map(|f| f.features.iter().cloned().fold(f32::INFINITY, f32::min));
            let db_max =
                feature.map(|f| f.features.iter().cloned().fold(f32::NEG_INFINITY, f32::max));
            ManifestLine {
                index: entry.index,
                source: entry.source.to_string_lossy().to_string(),
                sample_rate: entry.buffer.sample_rate,
                n_samples: entry.buffer.samples.len(),
                duration_secs: entry.buffer.duration_secs(),
                n_mels: feature.map(|f| f.features.nrows()),
                n_frames: feature.map(|f| f.features.ncols()),
                db_min,
                db_max,
            }
        })
        .collect()
}

pub fn write_manifest(
    cache_dir: &Path,
    run_id: &RunId,
    out_path: &Path,
    format: Format,
) -> Result<Summary> {
    let buffers = BufferCache::new(cache_dir)
        .load(run_id)?
        .into_option()
        .ok_or_else(|| anyhow!("no buffer cache for run {run_id} in {}", cache_dir.display()))?;
    let features = FeatureCache::new(cache_dir)
        .load(run_id)?
        .into_option()
        .unwrap_or_default();

    let lines = build_lines(&buffers, &features);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("Failed to create output: {}", out_path.display()))?;

    match format {
        Format::Jsonl => {
            let mut writer = BufWriter::new(out_file);
            for line in &lines {
                serde_json::to_writer(&mut writer, line)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(out_file);
            for line in &lines {
                writer.serialize(line)?;
            }
            writer.flush()?;
        }
    }

    let with_features = lines.iter().filter(|l| l.n_mels.is_some()).count();
    Ok(Summary {
        rows: lines.len(),
        with_features,
        without_features: lines.len() - with_features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use melcache_core::{AudioBuffer, BufferEntry};
    use ndarray::Array2;
    use std::path::PathBuf;

    fn buffers() -> BufferCollection {
        (0..3)
            .map(|i| BufferEntry {
                index: i,
                source: PathBuf::from(format!("clips/{i}.wav")),
                buffer: AudioBuffer::new(vec![0.0; 1000 * (i + 1)], 1000),
            })
            .collect()
    }

    fn features() -> FeatureCollection {
        // Completion order, with index 1 missing.
        vec![
            FeatureEntry {
                index: 2,
                source: PathBuf::from("clips/2.wav"),
                features: Array2::from_elem((4, 7), -3.0),
            },
            FeatureEntry {
                index: 0,
                source: PathBuf::from("clips/0.wav"),
                features: Array2::from_shape_fn((4, 2), |(m, _)| -(m as f32)),
            },
        ]
    }

    #[test]
    fn joins_features_by_index() {
        let lines = build_lines(&buffers(), &features());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].n_frames, Some(2));
        assert_eq!(lines[0].db_max, Some(0.0));
        assert_eq!(lines[0].db_min, Some(-3.0));
        assert_eq!(lines[1].n_mels, None);
        assert_eq!(lines[2].n_frames, Some(7));
        assert_eq!(lines[2].duration_secs, 3.0);
    }

    #[test]
    fn writes_jsonl_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunId::new("m");
        BufferCache::new(dir.path()).save(&buffers(), &run).unwrap();
        FeatureCache::new(dir.path()).save(&features(), &run).unwrap();

        let jsonl = dir.path().join("out/manifest.jsonl");
        let summary = write_manifest(dir.path(), &run, &jsonl, Format::Jsonl).unwrap();
        assert_eq!(
            summary,
            Summary {
                rows: 3,
                with_features: 2,
                without_features: 1
            }
        );
        let text = std::fs::read_to_string(&jsonl).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["source"], "clips/0.wav");
        assert_eq!(first["n_mels"], 4);

        let csv_path = dir.path().join("manifest.csv");
        write_manifest(dir.path(), &run, &csv_path, Format::Csv).unwrap();
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        assert_eq!(reader.records().count(), 3);
    }

    #[test]
    fn missing_buffer_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("m.jsonl");
        assert!(write_manifest(dir.path(), &RunId::new("none"), &out, Format::Jsonl).is_err());
    }
}
