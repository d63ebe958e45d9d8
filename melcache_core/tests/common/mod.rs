#![allow(dead_code)]

use std::path::Path;

use melcache_core::{PipelineConfig, RunId};

/// Write a mono 16-bit sine tone WAV.
pub fn write_tone(path: &Path, sample_rate: u32, freq: f32, n_samples: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..n_samples {
        let t = i as f32 / sample_rate as f32;
        let s = (2.0 * std::f32::consts::PI * freq * t).sin() * 0.6;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write an interleaved stereo 16-bit WAV with a different tone per channel.
pub fn write_stereo(path: &Path, sample_rate: u32, n_frames: usize) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..n_frames {
        let t = i as f32 / sample_rate as f32;
        let left = (2.0 * std::f32::consts::PI * 330.0 * t).sin() * 0.5;
        let right = (2.0 * std::f32::consts::PI * 660.0 * t).sin() * 0.5;
        writer.write_sample((left * i16::MAX as f32) as i16).unwrap();
        writer.write_sample((right * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Small pools and native sample rates keep the tests quick.
pub fn test_config(root: &Path, cache_dir: &Path, run_id: &str) -> PipelineConfig {
    let mut config = PipelineConfig::new(root, RunId::new(run_id)).with_cache_dir(cache_dir);
    config.loader.decode_workers = 2;
    config.loader.target_sample_rate = None;
    config.extract.extract_workers = 2;
    config
}
