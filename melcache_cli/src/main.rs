//! melcache: decode an audio folder into cached buffers and cached mel
//! spectrogram features.

mod settings;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use melcache_core::audio::{decoder, mel};
use melcache_core::{BufferStage, FeatureStage, MelConfig, PipelineConfig, RunId};

use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "melcache")]
#[command(about = "Cache decoded audio and mel spectrogram features for a folder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a folder and extract features, reusing caches from earlier runs
    Run(RunArgs),
    /// Extract features from the buffer cache of an earlier run
    Extract(ExtractArgs),
    /// Decode one file and print feature statistics
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// TOML settings file
    #[arg(short, long, env = "MELCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the cache artifacts
    #[arg(long, env = "MELCACHE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Threads used for feature extraction (default: host parallelism)
    #[arg(long, env = "MELCACHE_EXTRACT_WORKERS")]
    extract_workers: Option<usize>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Folder scanned recursively for .wav and .mp3 files
    root: PathBuf,

    /// Reuse a run id instead of deriving `<folder>_<YYYYMMDD-HHMMSS>`
    #[arg(long, env = "MELCACHE_RUN_ID")]
    run_id: Option<String>,

    /// Threads used for decoding (default: 8)
    #[arg(long, env = "MELCACHE_DECODE_WORKERS")]
    decode_workers: Option<usize>,

    /// Resample every file to this rate (default: 22050)
    #[arg(long, conflicts_with = "native_rate")]
    sample_rate: Option<u32>,

    /// Keep each file at its own sample rate
    #[arg(long)]
    native_rate: bool,

    /// Abort on the first file that fails to decode
    #[arg(long)]
    fail_fast: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Run id whose buffer cache is read
    #[arg(long, env = "MELCACHE_RUN_ID")]
    run_id: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct ProbeArgs {
    /// Audio file to decode
    file: PathBuf,

    /// Resample to this rate before extraction
    #[arg(long, default_value_t = 22_050)]
    sample_rate: u32,

    #[arg(long, default_value_t = 128)]
    n_mels: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "melcache=info,melcache_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Extract(args) => extract(args),
        Command::Probe(args) => probe(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let run_id = match args.run_id {
        Some(id) => RunId::new(id),
        None => derive_run_id(&args.root, &timestamp()),
    };

    let mut config = pipeline_config(args.root, run_id, &args.common)?;
    if let Some(workers) = args.decode_workers {
        config.loader.decode_workers = workers;
    }
    if args.native_rate {
        config.loader.target_sample_rate = None;
    } else if let Some(rate) = args.sample_rate {
        config.loader.target_sample_rate = Some(rate);
    }
    config.loader.fail_fast |= args.fail_fast;

    let report = melcache_core::pipeline::run(&config)?;

    match &report.buffers {
        BufferStage::Cached { path, buffers } => {
            info!("buffers: {buffers} reused from {}", path.display())
        }
        BufferStage::Decoded {
            path,
            discovered,
            decoded,
        } => info!(
            "buffers: {decoded} of {discovered} files decoded to {}",
            path.display()
        ),
    }
    report_features(&report.features);
    info!("run id: {}", report.run_id);
    Ok(())
}

fn extract(args: ExtractArgs) -> Result<()> {
    // The root is not read when only the feature stage runs.
    let config = pipeline_config(PathBuf::new(), RunId::new(args.run_id), &args.common)?;
    match melcache_core::pipeline::extract_cached(&config)? {
        Some(stage) => report_features(&stage),
        None => info!(
            "no buffers found for run {} in {}",
            config.run_id,
            config.cache_dir.display()
        ),
    }
    Ok(())
}

fn probe(args: ProbeArgs) -> Result<()> {
    let buffer = decoder::decode_file(&args.file, Some(args.sample_rate))?;
    let mel_config = MelConfig {
        n_mels: args.n_mels,
        ..MelConfig::default()
    };
    let features = mel::mel_db(&buffer, &mel_config)
        .with_context(|| format!("feature extraction failed for {}", args.file.display()))?;

    let min = features.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = features.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let nan_count = features.iter().filter(|x| x.is_nan()).count();
    let (n_mels, n_frames) = features.dim();

    println!(
        "decoded: {} samples @ {} Hz ({:.2}s)",
        buffer.samples.len(),
        buffer.sample_rate,
        buffer.duration_secs()
    );
    println!("mel shape: {n_mels} x {n_frames}");
    println!("mel stats: min={min}, max={max}, nan_count={nan_count}");
    if n_frames > 0 {
        println!("frame 0: {:?}", features.column(0).to_vec());
    }
    Ok(())
}

fn pipeline_config(root: PathBuf, run_id: RunId, common: &CommonArgs) -> Result<PipelineConfig> {
    let settings = Settings::load(common.config.as_deref())?;

    let mut config = PipelineConfig::new(root, run_id);
    config.loader = settings.loader;
    config.extract = settings.extract;
    if let Some(dir) = common.cache_dir.clone().or(settings.cache_dir) {
        config.cache_dir = dir;
    }
    if let Some(workers) = common.extract_workers {
        config.extract.extract_workers = workers;
    }
    Ok(config)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// `<last path component of root>_<timestamp>`.
fn derive_run_id(root: &Path, timestamp: &str) -> RunId {
    let folder = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .or_else(|| {
            root.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "root".to_string());
    RunId::from_folder_and_timestamp(&folder, timestamp)
}

fn report_features(stage: &FeatureStage) {
    match stage {
        FeatureStage::AlreadyCached(path) => {
            info!("features: already cached at {}", path.display())
        }
        FeatureStage::Extracted {
            path,
            extracted,
            failed,
        } => {
            info!(
                "features: {extracted} matrices saved to {} ({} failed)",
                path.display(),
                failed.len()
            );
            for item in failed {
                info!("  failed: {} ({})", item.source.display(), item.error);
            }
        }
    }
}
