use std::path::PathBuf;

use log::{info, warn};

use super::{
    batch::{load_split, RawSplit},
    dataset::ImageSet,
    record::save_record,
};
use crate::{
    config::{ImageDims, PrepConfig},
    error::{PrepErr, Result},
};

/// Number of trailing records that go to validation: `floor(n * ratio)`.
pub fn validation_cut(n: usize, valid_ratio: f64) -> usize {
    ((n as f64 * valid_ratio).floor() as usize).min(n)
}

/// Splits `set` into its train prefix and validation suffix.
///
/// Order is preserved and nothing is shuffled, so `train ++ validation`
/// reproduces `set`.
///
/// # Errors
/// Returns `PrepErr::InvalidConfig` unless `0 < valid_ratio < 1`.
pub fn split_off_validation(set: ImageSet, valid_ratio: f64) -> Result<(ImageSet, ImageSet)> {
    if !(valid_ratio > 0.0 && valid_ratio < 1.0) {
        return Err(PrepErr::InvalidConfig(format!(
            "valid_ratio ({valid_ratio}) must lie strictly between 0 and 1"
        )));
    }

    let cut = validation_cut(set.len(), valid_ratio);
    if cut == 0 {
        warn!(
            "valid_ratio {valid_ratio} over {} records leaves the validation split empty",
            set.len()
        );
    }

    let at = set.len() - cut;
    Ok(set.split_at(at))
}

/// Record counts written by [`Preprocessor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSummary {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

/// Turns the raw train/test records into the three persisted splits.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    raw_dir: PathBuf,
    image: ImageDims,
    num_classes: usize,
    valid_ratio: f64,
    train_path: PathBuf,
    valid_path: PathBuf,
    test_path: PathBuf,
}

impl Preprocessor {
    /// # Args
    /// * `config` - Supplies the ratio, image layout and output files.
    /// * `raw_dir` - The extracted directory holding `train` and `test`.
    /// * `num_classes` - Upper bound (exclusive) for fine labels.
    pub fn new<P: Into<PathBuf>>(config: &PrepConfig, raw_dir: P, num_classes: usize) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            image: config.image,
            num_classes,
            valid_ratio: config.valid_ratio,
            train_path: config.train_path(),
            valid_path: config.valid_path(),
            test_path: config.test_path(),
        }
    }

    /// Loads, splits and saves. Always rewrites all three files.
    ///
    /// # Errors
    /// Propagates any load, split or save failure; files written before the
    /// failure stay on disk.
    pub fn run(&self) -> Result<SplitSummary> {
        let full = load_split(&self.raw_dir, RawSplit::Train, self.image, self.num_classes)?;
        let (train, validation) = split_off_validation(full, self.valid_ratio)?;
        info!(
            "split training set into {} train / {} validation records",
            train.len(),
            validation.len()
        );

        save_record(&self.train_path, &train, "train")?;
        save_record(&self.valid_path, &validation, "validation")?;

        let test = load_split(&self.raw_dir, RawSplit::Test, self.image, self.num_classes)?;
        save_record(&self.test_path, &test, "test")?;

        Ok(SplitSummary {
            train: train.len(),
            validation: validation.len(),
            test: test.len(),
        })
    }
}
