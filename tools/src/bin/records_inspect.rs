use anyhow::Context;
use clap::Parser;
use monkey_tools::{init_logging, ToolConfig};
use record_dataset::etl::sibling_manifest;
use record_dataset::{decode_record, DatasetManifest, RecordReader};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "records_inspect",
    about = "Count records and labels in record containers and verify manifest checksums"
)]
struct Args {
    /// Containers to inspect (defaults to the configured train and test containers).
    containers: Vec<PathBuf>,
    /// Also recompute SHA-256 checksums against a sibling manifest.json.
    #[arg(long, default_value_t = false)]
    verify: bool,
    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

struct ContainerStats {
    records: usize,
    labels: BTreeMap<i32, usize>,
}

fn inspect(path: &Path) -> anyhow::Result<ContainerStats> {
    let reader = RecordReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut stats = ContainerStats {
        records: 0,
        labels: BTreeMap::new(),
    };
    for raw in reader {
        let raw = raw.with_context(|| format!("reading {}", path.display()))?;
        let sample = decode_record(&raw)
            .with_context(|| format!("decoding record {} of {}", stats.records, path.display()))?;
        *stats.labels.entry(sample.label).or_default() += 1;
        stats.records += 1;
    }
    Ok(stats)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = ToolConfig::load();
    init_logging(args.log_level.as_deref().unwrap_or(&cfg.log_level));

    let containers = if args.containers.is_empty() {
        vec![cfg.train_path(), cfg.test_path()]
    } else {
        args.containers
    };

    let mut verified = Vec::<PathBuf>::new();
    for path in &containers {
        let stats = inspect(path)?;
        let manifest = sibling_manifest(path)
            .map(|p| DatasetManifest::load(&p).with_context(|| format!("loading {}", p.display())))
            .transpose()?;

        println!("{}: {} records", path.display(), stats.records);
        for (label, count) in &stats.labels {
            let name = manifest
                .as_ref()
                .and_then(|m| m.classes.get(*label as usize))
                .map(String::as_str)
                .unwrap_or("?");
            println!("  [{label}] {name}: {count}");
        }

        let Some(manifest) = manifest else {
            continue;
        };
        let file_name = path.file_name().map(PathBuf::from);
        if let Some(entry) = manifest
            .containers
            .iter()
            .find(|c| Some(&c.relative_path) == file_name.as_ref())
        {
            if entry.records != stats.records {
                anyhow::bail!(
                    "{} holds {} records but the manifest lists {}",
                    path.display(),
                    stats.records,
                    entry.records
                );
            }
        }
        if args.verify {
            let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            if !verified.contains(&dir) {
                manifest
                    .verify_checksums(&dir)
                    .with_context(|| format!("verifying checksums under {}", dir.display()))?;
                println!("checksums ok under {}", dir.display());
                verified.push(dir);
            }
        }
    }
    Ok(())
}
