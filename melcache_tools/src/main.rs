mod manifest;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use melcache_core::RunId;

/// Write a per-file manifest of a run's cached buffers and features.
#[derive(Parser, Debug)]
#[command(name = "cache_manifest")]
struct Args {
    /// Run id the caches were written under
    run_id: String,

    /// Directory holding the cache artifacts
    #[arg(long, default_value = ".")]
    cache_dir: PathBuf,

    /// Output file
    #[arg(short, long, default_value = "manifests/cache.jsonl")]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = manifest::Format::Jsonl)]
    format: manifest::Format,
}

fn main() -> Result<()> {
    let args = Args::parse();
    println!("Writing manifest for run {}", args.run_id);

    let summary = manifest::write_manifest(
        &args.cache_dir,
        &RunId::new(args.run_id),
        &args.out,
        args.format,
    )?;

    println!("Wrote: {}", args.out.display());
    println!("Rows: {}", summary.rows);
    println!("With features: {}", summary.with_features);
    println!("Without features: {}", summary.without_features);
    Ok(())
}
