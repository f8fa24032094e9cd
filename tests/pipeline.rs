mod common;

use std::{fs, num::NonZeroUsize};

use cifar100_prep::{
    data::{load_record, RawSplit},
    Cifar100, ExtractOutcome, FetchOutcome, PrepConfig, PrepErr,
};
use ndarray::Axis;

use common::{label, pixel, write_archive};

const NAMES: [&[u8]; 3] = [b"apple", b"aquarium_fish", b"caf\xe9"];

/// A config rooted in `dir` whose archive already sits on disk, so nothing
/// touches the network.
fn prepared(dir: &std::path::Path, train: usize, test: usize) -> PrepConfig {
    let mut config = PrepConfig::rooted(dir);
    config.archive_url = "http://127.0.0.1:9/unreachable.tar.gz".to_string();
    config.batch_size = NonZeroUsize::new(32).unwrap();
    write_archive(&config.archive_path(), train, test, &NAMES);
    config
}

#[test]
fn end_to_end_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let cifar = Cifar100::new(prepared(dir.path(), 100, 20)).unwrap();

    let (fetched, extracted) = cifar.download().unwrap();
    assert_eq!(fetched, FetchOutcome::AlreadyPresent);
    assert!(matches!(extracted, ExtractOutcome::Extracted(n) if n >= 3));

    let summary = cifar.preprocess_and_save().unwrap();
    assert_eq!(
        (summary.train, summary.validation, summary.test),
        (90, 10, 20)
    );

    // Validation is the last tenth of the raw training records.
    let valid = load_record(&cifar.config().valid_path()).unwrap();
    let expected: Vec<u8> = (90..100).map(label).collect();
    assert_eq!(valid.labels(), &expected[..]);
    assert_eq!(valid.features().dim(), (10, 32, 32, 3));
    for (k, image) in valid.features().axis_iter(Axis(0)).enumerate() {
        for (c, plane) in image.axis_iter(Axis(2)).enumerate() {
            assert!(plane.iter().all(|&p| p == pixel(90 + k, c)));
        }
    }

    let train = load_record(&cifar.config().train_path()).unwrap();
    assert_eq!(train.len(), 90);
    assert_eq!(train.labels()[..3], [label(0), label(1), label(2)]);
}

#[test]
fn training_batches_and_accessors() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = prepared(dir.path(), 105, 7);
    config.resize_to.height = 64;
    config.resize_to.width = 48;
    let cifar = Cifar100::new(config).unwrap();
    cifar.download().unwrap();
    cifar.preprocess_and_save().unwrap();

    // 105 records at 0.1 leaves 95 for training.
    let mut batches = cifar.training_batches(false).unwrap();
    assert_eq!(batches.num_batches(), 3);
    let mut sizes = Vec::new();
    let mut seen = Vec::new();
    while let Some(batch) = batches.next_batch() {
        assert_eq!(batch.features.dim().1, 32);
        sizes.push(batch.len());
        seen.extend_from_slice(batch.labels);
    }
    assert_eq!(sizes, [32, 32, 31]);
    assert_eq!(seen, (0..95).map(label).collect::<Vec<_>>());

    let resized: Vec<_> = cifar.training_batches(true).unwrap().collect();
    assert_eq!(resized.len(), 3);
    assert_eq!(resized[0].features.dim(), (32, 64, 48, 3));

    let valid = cifar.valid_set().unwrap();
    assert_eq!(valid.features().dim(), (10, 64, 48, 3));
    assert_eq!(valid.labels(), &(95..105).map(label).collect::<Vec<_>>()[..]);

    let test = cifar.test_set().unwrap();
    assert_eq!(test.features().dim(), (7, 32, 32, 3));
    assert_eq!(test.labels(), &(0..7).map(label).collect::<Vec<_>>()[..]);
}

#[test]
fn raw_batches_and_label_names() {
    let dir = tempfile::tempdir().unwrap();
    let cifar = Cifar100::new(prepared(dir.path(), 4, 2)).unwrap();
    cifar.download().unwrap();

    let train = cifar.load_batch(RawSplit::Train).unwrap();
    assert_eq!(train.features().dim(), (4, 32, 32, 3));
    assert_eq!(train.features()[[3, 5, 7, 2]], pixel(3, 2));

    let names = cifar.label_names().unwrap();
    assert_eq!(names, ["apple", "aquarium_fish", "caf\u{e9}"]);
}

#[test]
fn rerunning_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let cifar = Cifar100::new(prepared(dir.path(), 30, 5)).unwrap();

    cifar.download().unwrap();
    let first = cifar.preprocess_and_save().unwrap();
    let saved = load_record(&cifar.config().train_path()).unwrap();

    let (fetched, extracted) = cifar.download().unwrap();
    assert_eq!(fetched, FetchOutcome::AlreadyPresent);
    assert_eq!(extracted, ExtractOutcome::AlreadyPresent);

    assert_eq!(cifar.preprocess_and_save().unwrap(), first);
    assert_eq!(load_record(&cifar.config().train_path()).unwrap(), saved);
}

#[test]
fn corrupt_archive_fails_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let config = PrepConfig::rooted(dir.path());
    fs::write(config.archive_path(), b"not a tarball").unwrap();

    let cifar = Cifar100::new(config).unwrap();
    assert!(matches!(
        cifar.download(),
        Err(PrepErr::Extraction { .. })
    ));
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cifar100.json");
    fs::write(
        &path,
        r#"{ "valid_ratio": 0.25, "batch_size": 16, "resize_to": { "height": 96, "width": 96 } }"#,
    )
    .unwrap();

    let config = PrepConfig::from_path(&path).unwrap();
    assert_eq!(config.valid_ratio, 0.25);
    assert_eq!(config.batch_size.get(), 16);
    assert_eq!(config.resize_to.height, 96);
    assert_eq!(config.num_classes, 100);

    fs::write(&path, r#"{ "valid_ratio": 1.0 }"#).unwrap();
    assert!(matches!(
        PrepConfig::from_path(&path),
        Err(PrepErr::InvalidConfig(_))
    ));
}
