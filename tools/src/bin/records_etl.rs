use anyhow::Context;
use clap::Parser;
use monkey_tools::{init_logging, ToolConfig};
use record_dataset::{encode_dataset, SplitKind};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "records_etl",
    about = "Encode a class-per-directory image tree into train/test record containers"
)]
struct Args {
    /// Root containing one subdirectory per class.
    #[arg(long)]
    input_root: Option<PathBuf>,
    /// Directory for the containers and manifest.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Fraction of the listing written to the train container.
    #[arg(long)]
    train_fraction: Option<f64>,
    /// Skip writing manifest.json.
    #[arg(long, default_value_t = false)]
    no_manifest: bool,
    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut cfg = ToolConfig::load();
    init_logging(args.log_level.as_deref().unwrap_or(&cfg.log_level));
    cfg.apply_encode_overrides(args.input_root, args.output_dir, args.train_fraction);
    for warning in cfg.warnings() {
        tracing::warn!("tools config: {warning}");
    }

    let mut opts = cfg.encode_options();
    opts.write_manifest = !args.no_manifest;
    let started = Instant::now();
    let manifest = encode_dataset(&opts).with_context(|| {
        format!(
            "encoding {} into {}",
            opts.dataset_root.display(),
            opts.output_dir.display()
        )
    })?;

    println!(
        "Encoded {} images in {} classes in {:.1}s",
        manifest.summary.total,
        manifest.classes.len(),
        started.elapsed().as_secs_f64()
    );
    for split in [SplitKind::Train, SplitKind::Test] {
        if let Some(c) = manifest.container(split) {
            println!(
                " - {}: {} records, {} skipped, {} bytes -> {}",
                split.as_str(),
                c.records,
                c.skipped,
                c.bytes,
                opts.output_dir.join(&c.relative_path).display()
            );
        }
    }
    if opts.write_manifest {
        println!("Manifest written to {}", opts.manifest_path().display());
    }
    Ok(())
}
