use burn::tensor::Tensor;
use image::{Rgb, RgbImage};
use monkey_tools::ToolConfig;
use record_dataset::{ImageRecord, RecordWriter, IMAGE_BYTES};
use std::path::Path;
use training::{run_train_with, ClassifierHead, ClassifierHeadConfig, TrainArgs, TrainBackend};

fn write_container(path: &Path, labels: &[i64]) -> anyhow::Result<()> {
    let mut writer = RecordWriter::create(path)?;
    for &label in labels {
        let image = ImageRecord {
            width: 224,
            height: 224,
            pixels: vec![(label as u8).wrapping_mul(60); IMAGE_BYTES],
        };
        writer.write_record(label, &image)?;
    }
    writer.finish()?;
    Ok(())
}

#[test]
fn head_maps_images_to_logits() {
    let device = Default::default();
    let head = ClassifierHead::<TrainBackend>::new(&ClassifierHeadConfig::with_classes(4), &device);
    let images = Tensor::<TrainBackend, 4>::zeros([2, 16, 16, 3], &device);
    assert_eq!(head.forward(images).dims(), [2, 4]);
}

#[test]
fn trains_and_evaluates_on_small_containers() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let train = tmp.path().join("mon_train.tfrecords");
    let test = tmp.path().join("mon_test.tfrecords");
    write_container(&train, &[0, 1, 0, 1])?;
    write_container(&test, &[1, 0, 1])?;

    let args = TrainArgs {
        train_records: Some(train),
        test_records: Some(test),
        num_classes: Some(2),
        steps: Some(3),
        batch_size: Some(2),
        seed: Some(1),
        log_every: 1,
        checkpoint_out: Some(tmp.path().join("ckpt").join("head")),
        ..TrainArgs::default()
    };
    let summary = run_train_with(&args, ToolConfig::default())?;
    assert_eq!(summary.samples, 3);
    assert!((0.0..=1.0).contains(&summary.accuracy));
    assert!(summary.loss.is_finite());
    assert!(std::fs::read_dir(tmp.path().join("ckpt"))?.count() > 0);
    Ok(())
}

#[test]
fn rejects_labels_beyond_num_classes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let train = tmp.path().join("mon_train.tfrecords");
    write_container(&train, &[0, 3])?;

    let args = TrainArgs {
        train_records: Some(train.clone()),
        test_records: Some(train),
        num_classes: Some(2),
        steps: Some(1),
        batch_size: Some(2),
        seed: Some(1),
        ..TrainArgs::default()
    };
    let err = run_train_with(&args, ToolConfig::default()).unwrap_err();
    assert!(err.to_string().contains("outside 0..2"));
    Ok(())
}

#[test]
fn encode_evaluates_the_written_test_container() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("training");
    for (class, count) in [("n0", 3), ("n1", 2)] {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir)?;
        for i in 0..count {
            RgbImage::from_pixel(8, 8, Rgb([i as u8 * 40, 90, 180]))
                .save(dir.join(format!("{i}.png")))?;
        }
    }
    let train = tmp.path().join("a").join("mon_train.tfrecords");
    let requested_test = tmp.path().join("b").join("mon_test.tfrecords");

    let args = TrainArgs {
        encode: true,
        training_root: Some(root),
        train_records: Some(train),
        test_records: Some(requested_test.clone()),
        steps: Some(1),
        batch_size: Some(2),
        seed: Some(1),
        ..TrainArgs::default()
    };
    let cfg = ToolConfig {
        train_fraction: 0.8,
        ..ToolConfig::default()
    };
    let summary = run_train_with(&args, cfg)?;
    assert_eq!(summary.samples, 1);
    assert!(tmp.path().join("a").join("mon_test.tfrecords").exists());
    assert!(!requested_test.exists());
    Ok(())
}
