use std::fs;
use std::path::PathBuf;

use monkey_tools::ToolConfig;
use record_dataset::Mode;

fn write_temp_config(name: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("monkey-tools-test-{}-{name}.toml", std::process::id()));
    fs::write(&path, contents).expect("write temp config");
    path
}

#[test]
fn loads_minimal_config() {
    let path = write_temp_config("minimal", "training_root = \"images\"\n");
    let cfg = ToolConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.training_root, PathBuf::from("images"));
    assert_eq!(cfg.train_container, "mon_train.tfrecords");
    assert_eq!(cfg.batch_size, 64);
    assert_eq!(cfg.steps, 10_000);
    let _ = fs::remove_file(&path);
}

#[test]
fn loads_all_sections() {
    let path = write_temp_config(
        "full",
        r#"
training_root = "data/training"
output_dir = "out"
log_level = "debug"

[records]
train = "a.tfrecords"
test = "b.tfrecords"
train_fraction = 0.5

[pipeline]
batch_size = 16
shuffle_buffer = 200
seed = 42

[training]
steps = 25
learning_rate = 0.001
"#,
    );
    let cfg = ToolConfig::from_path(&path).expect("load config");
    assert_eq!(cfg.train_path(), PathBuf::from("out/a.tfrecords"));
    assert_eq!(cfg.test_path(), PathBuf::from("out/b.tfrecords"));
    assert_eq!(cfg.train_fraction, 0.5);
    assert_eq!(cfg.log_level, "debug");
    assert_eq!(cfg.steps, 25);

    let pipeline = cfg.pipeline_config(Mode::Train);
    assert_eq!(pipeline.batch_size, 16);
    assert_eq!(pipeline.shuffle_buffer_size, 200);
    assert_eq!(pipeline.seed, Some(42));

    let opts = cfg.encode_options();
    assert_eq!(opts.dataset_root, PathBuf::from("data/training"));
    assert_eq!(opts.test_name, "b.tfrecords");
    let _ = fs::remove_file(&path);
}

#[test]
fn missing_or_invalid_file_is_none() {
    assert!(ToolConfig::from_path(&std::env::temp_dir().join("monkey-tools-absent.toml")).is_none());
    let path = write_temp_config("invalid", "[pipeline]\nbatch_size = \"many\"\n");
    assert!(ToolConfig::from_path(&path).is_none());
    let _ = fs::remove_file(&path);
}

#[test]
fn warnings_reflect_encode_overrides() {
    let path = write_temp_config("override", "[records]\ntrain_fraction = 1.5\n");
    let mut cfg = ToolConfig::from_path(&path).expect("load config");
    assert!(cfg.warnings().iter().any(|w| w.contains("train_fraction")));

    cfg.apply_encode_overrides(Some(PathBuf::from("imgs")), Some(PathBuf::from("out")), Some(0.5));
    assert!(cfg.warnings().iter().all(|w| !w.contains("train_fraction")));
    assert_eq!(cfg.encode_options().dataset_root, PathBuf::from("imgs"));
    assert_eq!(cfg.train_path(), PathBuf::from("out/mon_train.tfrecords"));

    cfg.apply_encode_overrides(None, None, Some(-0.1));
    assert!(cfg.warnings().iter().any(|w| w.contains("train_fraction")));
    assert_eq!(cfg.training_root, PathBuf::from("imgs"));
    let _ = fs::remove_file(&path);
}
