use std::path::{Path, PathBuf};

use record_dataset::etl::{DEFAULT_TEST_CONTAINER, DEFAULT_TRAIN_CONTAINER};
use record_dataset::pipeline::{DEFAULT_BATCH_SIZE, DEFAULT_SHUFFLE_BUFFER_SIZE};
use record_dataset::{EncodeOptions, Mode, PipelineConfig, DEFAULT_TRAIN_FRACTION};
use serde::Deserialize;

pub const DEFAULT_CONFIG_NAME: &str = "monkey-tools.toml";
pub const CONFIG_ENV_VAR: &str = "MONKEY_TOOLS_CONFIG";
pub const DEFAULT_STEPS: usize = 10_000;
pub const DEFAULT_LEARNING_RATE: f64 = 1e-5;

/// Paths and hyperparameters shared by the encode, inspect and train binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    /// Root holding one subdirectory per class.
    pub training_root: PathBuf,
    /// Directory holding the containers and manifest.
    pub output_dir: PathBuf,
    pub train_container: String,
    pub test_container: String,
    pub train_fraction: f64,
    pub batch_size: usize,
    pub shuffle_buffer: usize,
    pub seed: Option<u64>,
    pub steps: usize,
    pub learning_rate: f64,
    pub log_level: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            training_root: PathBuf::from("training"),
            output_dir: PathBuf::from("."),
            train_container: DEFAULT_TRAIN_CONTAINER.to_string(),
            test_container: DEFAULT_TEST_CONTAINER.to_string(),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            batch_size: DEFAULT_BATCH_SIZE,
            shuffle_buffer: DEFAULT_SHUFFLE_BUFFER_SIZE,
            seed: None,
            steps: DEFAULT_STEPS,
            learning_rate: DEFAULT_LEARNING_RATE,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ToolConfigFile {
    training_root: Option<String>,
    output_dir: Option<String>,
    records: Option<RecordsSection>,
    pipeline: Option<PipelineSection>,
    training: Option<TrainingSection>,
    log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordsSection {
    train: Option<String>,
    test: Option<String>,
    train_fraction: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineSection {
    batch_size: Option<usize>,
    shuffle_buffer: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrainingSection {
    steps: Option<usize>,
    learning_rate: Option<f64>,
}

impl ToolConfig {
    /// Load from `$MONKEY_TOOLS_CONFIG`, else `./monkey-tools.toml`, else defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_path(Path::new(&path)).unwrap_or_default();
        }
        Self::from_path(Path::new(DEFAULT_CONFIG_NAME)).unwrap_or_default()
    }

    /// `None` when the file is missing or is not valid TOML for this layout.
    pub fn from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        let raw = std::fs::read_to_string(path).ok()?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Option<Self> {
        let file: ToolConfigFile = toml::from_str(raw).ok()?;
        Some(Self::from_file(file))
    }

    fn from_file(file: ToolConfigFile) -> Self {
        let defaults = Self::default();
        let records = file.records.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let training = file.training.unwrap_or_default();
        ToolConfig {
            training_root: file
                .training_root
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.training_root),
            output_dir: file
                .output_dir
                .map(|v| expand_path(&v))
                .unwrap_or(defaults.output_dir),
            train_container: records.train.unwrap_or(defaults.train_container),
            test_container: records.test.unwrap_or(defaults.test_container),
            train_fraction: records.train_fraction.unwrap_or(defaults.train_fraction),
            batch_size: pipeline.batch_size.unwrap_or(defaults.batch_size),
            shuffle_buffer: pipeline.shuffle_buffer.unwrap_or(defaults.shuffle_buffer),
            seed: pipeline.seed,
            steps: training.steps.unwrap_or(defaults.steps),
            learning_rate: training.learning_rate.unwrap_or(defaults.learning_rate),
            log_level: file
                .log_level
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(defaults.log_level),
        }
    }

    /// Fold encode command-line overrides in; call before `warnings`.
    pub fn apply_encode_overrides(
        &mut self,
        input_root: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        train_fraction: Option<f64>,
    ) {
        if let Some(root) = input_root {
            self.training_root = root;
        }
        if let Some(dir) = output_dir {
            self.output_dir = dir;
        }
        if let Some(fraction) = train_fraction {
            self.train_fraction = fraction;
        }
    }

    /// Human-readable problems with the loaded values; binaries log these once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !(0.0..=1.0).contains(&self.train_fraction) {
            out.push(format!(
                "records.train_fraction {} is outside [0, 1]; it will be clamped",
                self.train_fraction
            ));
        }
        if self.batch_size == 0 {
            out.push("pipeline.batch_size is 0; pipelines will refuse to build".to_string());
        }
        if self.shuffle_buffer <= 1 {
            out.push("pipeline.shuffle_buffer <= 1; training batches will not be shuffled".to_string());
        }
        if self.train_container == self.test_container {
            out.push(format!(
                "records.train and records.test are both {}; the test split overwrites the train split",
                self.train_container
            ));
        }
        if self.learning_rate <= 0.0 {
            out.push(format!("training.learning_rate {} is not positive", self.learning_rate));
        }
        out
    }

    pub fn train_path(&self) -> PathBuf {
        self.output_dir.join(&self.train_container)
    }

    pub fn test_path(&self) -> PathBuf {
        self.output_dir.join(&self.test_container)
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            train_name: self.train_container.clone(),
            test_name: self.test_container.clone(),
            train_fraction: self.train_fraction,
            ..EncodeOptions::new(&self.training_root, &self.output_dir)
        }
    }

    pub fn pipeline_config(&self, mode: Mode) -> PipelineConfig {
        let base = match mode {
            Mode::Train => PipelineConfig::train(),
            Mode::Eval => PipelineConfig::eval(),
        };
        PipelineConfig {
            batch_size: self.batch_size,
            shuffle_buffer_size: self.shuffle_buffer,
            seed: self.seed,
            ..base
        }
    }
}

/// Expand a leading `~` and `${VAR}` references.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

/// Unknown variables are left as written.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&rest[start..start + 2 + end + 1]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_and_keeps_unknown_vars() {
        std::env::set_var("MONKEY_TOOLS_TEST_DIR", "/data/monkeys");
        assert_eq!(
            expand_env("${MONKEY_TOOLS_TEST_DIR}/training"),
            "/data/monkeys/training"
        );
        assert_eq!(
            expand_env("x/${MONKEY_TOOLS_SURELY_UNSET}/y"),
            "x/${MONKEY_TOOLS_SURELY_UNSET}/y"
        );
        assert_eq!(expand_env("open ${brace"), "open ${brace");
        assert_eq!(expand_env("plain"), "plain");
    }

    #[test]
    fn pipeline_config_follows_mode() {
        let cfg = ToolConfig {
            batch_size: 8,
            seed: Some(3),
            ..ToolConfig::default()
        };
        let train = cfg.pipeline_config(Mode::Train);
        assert_eq!(train.mode, Mode::Train);
        assert_eq!(train.batch_size, 8);
        assert_eq!(train.seed, Some(3));
        assert_eq!(cfg.pipeline_config(Mode::Eval).mode, Mode::Eval);
    }

    #[test]
    fn defaults_have_no_warnings() {
        assert!(ToolConfig::default().warnings().is_empty());
        let bad = ToolConfig {
            batch_size: 0,
            train_fraction: 1.5,
            ..ToolConfig::default()
        };
        assert_eq!(bad.warnings().len(), 2);
    }
}
