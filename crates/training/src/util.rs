use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use clap::Parser;
use monkey_tools::ToolConfig;
use record_dataset::etl::sibling_manifest;
use record_dataset::{encode_dataset, Batch, BatchPipeline, DatasetManifest, Mode};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::metrics::{EvalAccumulator, EvalSummary};
use crate::model::{ClassifierHead, ClassifierHeadConfig};
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

const FALLBACK_NUM_CLASSES: usize = 10;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "train",
    about = "Fit a classification head on record containers, then evaluate it"
)]
pub struct TrainArgs {
    /// Train container (defaults to the configured one).
    #[arg(long)]
    pub train_records: Option<PathBuf>,
    /// Test container (defaults to the configured one).
    #[arg(long)]
    pub test_records: Option<PathBuf>,
    /// Encode the image tree into the containers before training.
    #[arg(long, default_value_t = false)]
    pub encode: bool,
    /// Image tree used with --encode.
    #[arg(long)]
    pub training_root: Option<PathBuf>,
    /// Number of classes (defaults to the manifest, then 10).
    #[arg(long)]
    pub num_classes: Option<usize>,
    /// Optimizer steps; each consumes one batch.
    #[arg(long)]
    pub steps: Option<usize>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub shuffle_buffer: Option<usize>,
    /// Learning rate.
    #[arg(long)]
    pub lr: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Decode on a background thread with this many samples queued.
    #[arg(long)]
    pub prefetch: Option<usize>,
    /// Log the running loss every N steps (0 disables).
    #[arg(long, default_value_t = 100)]
    pub log_every: usize,
    /// Save the trained head to this path.
    #[arg(long)]
    pub checkpoint_out: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl TrainArgs {
    /// Fold command-line overrides into the tool config.
    pub fn apply(&self, cfg: &mut ToolConfig) {
        if let Some(root) = &self.training_root {
            cfg.training_root = root.clone();
        }
        if let Some(steps) = self.steps {
            cfg.steps = steps;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.batch_size = batch_size;
        }
        if let Some(shuffle) = self.shuffle_buffer {
            cfg.shuffle_buffer = shuffle;
        }
        if let Some(lr) = self.lr {
            cfg.learning_rate = lr;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
    }
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<EvalSummary> {
    run_train_with(&args, ToolConfig::load())
}

pub fn run_train_with(args: &TrainArgs, mut cfg: ToolConfig) -> anyhow::Result<EvalSummary> {
    args.apply(&mut cfg);
    for warning in cfg.warnings() {
        tracing::warn!("tools config: {warning}");
    }
    let train_path = args.train_records.clone().unwrap_or_else(|| cfg.train_path());
    let mut test_path = args.test_records.clone().unwrap_or_else(|| cfg.test_path());

    let mut manifest = None;
    if args.encode {
        let mut opts = cfg.encode_options();
        if let Some(dir) = train_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            opts.output_dir = dir.to_path_buf();
        }
        if let Some(name) = train_path.file_name() {
            opts.train_name = name.to_string_lossy().into_owned();
        }
        if let Some(name) = test_path.file_name() {
            opts.test_name = name.to_string_lossy().into_owned();
        }
        let written = encode_dataset(&opts)
            .with_context(|| format!("encoding {}", opts.dataset_root.display()))?;
        if opts.test_path() != test_path {
            tracing::warn!(
                requested = %test_path.display(),
                written = %opts.test_path().display(),
                "test container written next to the train container; evaluating the written one"
            );
            test_path = opts.test_path();
        }
        manifest = Some(written);
    } else if let Some(path) = sibling_manifest(&train_path) {
        manifest = Some(
            DatasetManifest::load(&path).with_context(|| format!("loading {}", path.display()))?,
        );
    }

    let num_classes = args
        .num_classes
        .or_else(|| manifest.as_ref().map(|m| m.classes.len()))
        .unwrap_or(FALLBACK_NUM_CLASSES);
    if num_classes == 0 {
        anyhow::bail!("num_classes must be at least 1");
    }

    let device = <TrainBackend as Backend>::Device::default();
    let head_cfg = ClassifierHeadConfig::with_classes(num_classes);
    let model = ClassifierHead::<ADBackend>::new(&head_cfg, &device);

    let mut train_cfg = cfg.pipeline_config(Mode::Train);
    train_cfg.prefetch = args.prefetch;
    let model = fit(model, &train_path, &train_cfg, &cfg, args.log_every, num_classes, &device)?;
    let model = model.valid();

    if let Some(path) = &args.checkpoint_out {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(path.as_path(), &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
        tracing::info!(path = %path.display(), "saved checkpoint");
    }

    let mut eval_cfg = cfg.pipeline_config(Mode::Eval);
    eval_cfg.prefetch = args.prefetch;
    let summary = evaluate(&model, &test_path, &eval_cfg, num_classes, &device)?;
    println!("{summary}");
    Ok(summary)
}

fn check_labels(batch: &Batch, num_classes: usize) -> anyhow::Result<()> {
    if let Some(bad) = batch
        .labels
        .iter()
        .find(|&&l| l < 0 || l as usize >= num_classes)
    {
        anyhow::bail!("label {bad} is outside 0..{num_classes}; pass --num-classes");
    }
    Ok(())
}

fn fit(
    mut model: ClassifierHead<ADBackend>,
    train_path: &Path,
    pipeline_cfg: &record_dataset::PipelineConfig,
    cfg: &ToolConfig,
    log_every: usize,
    num_classes: usize,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<ClassifierHead<ADBackend>> {
    if cfg.steps == 0 {
        return Ok(model);
    }
    let mut batches = BatchPipeline::build(&[train_path.to_path_buf()], pipeline_cfg)
        .with_context(|| format!("building train pipeline over {}", train_path.display()))?;
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optim = AdamConfig::new().init();

    let started = Instant::now();
    let mut window = Vec::with_capacity(log_every.max(1));
    for step in 0..cfg.steps {
        let batch = match batches.next() {
            Some(batch) => batch.with_context(|| format!("reading {}", train_path.display()))?,
            None => anyhow::bail!("train pipeline ended after {step} steps"),
        };
        check_labels(&batch, num_classes)?;
        let batch = batch.to_burn::<ADBackend>(device);

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits, batch.labels);
        let loss_val: f32 = loss.clone().into_scalar().elem();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(cfg.learning_rate, model, grads);

        window.push(loss_val);
        if log_every > 0 && (step + 1) % log_every == 0 {
            let avg = window.iter().sum::<f32>() / window.len() as f32;
            tracing::info!(
                step = step + 1,
                steps = cfg.steps,
                loss = avg,
                elapsed_s = started.elapsed().as_secs_f64(),
                "training"
            );
            window.clear();
        }
    }
    tracing::info!(
        steps = cfg.steps,
        elapsed_s = started.elapsed().as_secs_f64(),
        "training finished"
    );
    Ok(model)
}

/// One ordered pass over `test_path`.
pub fn evaluate(
    model: &ClassifierHead<TrainBackend>,
    test_path: &Path,
    pipeline_cfg: &record_dataset::PipelineConfig,
    num_classes: usize,
    device: &<TrainBackend as Backend>::Device,
) -> anyhow::Result<EvalSummary> {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut acc = EvalAccumulator::default();
    let batches = BatchPipeline::build(&[test_path.to_path_buf()], pipeline_cfg)
        .with_context(|| format!("building eval pipeline over {}", test_path.display()))?;
    for batch in batches {
        let batch = batch.with_context(|| format!("reading {}", test_path.display()))?;
        check_labels(&batch, num_classes)?;
        let n = batch.len();
        let batch = batch.to_burn::<TrainBackend>(device);

        let logits = model.forward(batch.images);
        let loss: f32 = loss_fn
            .forward(logits.clone(), batch.labels.clone())
            .into_scalar()
            .elem();
        let preds = logits.argmax(1).reshape([n]);
        let correct: i64 = preds.equal(batch.labels).int().sum().into_scalar().elem();
        acc.update(loss, correct.max(0) as usize, n);
    }
    if acc.batches() == 0 {
        tracing::warn!(path = %test_path.display(), "test container holds no records");
    }
    Ok(acc.finish())
}
