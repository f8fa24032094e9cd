use log::info;

use crate::{
    config::PrepConfig,
    data::{
        load_label_names, load_record, load_split, resize_images, BatchIter, ImageSet,
        Preprocessor, RawSplit, SplitSummary,
    },
    error::Result,
    extract::{ExtractOutcome, Extractor},
    fetch::{FetchOutcome, Fetcher},
    source::{DatasetInfo, DatasetSource},
};

/// The CIFAR-100 preparation pipeline: fetch, extract, preprocess, then read
/// the persisted splits back.
#[derive(Debug, Clone)]
pub struct Cifar100<S: DatasetSource = DatasetInfo> {
    config: PrepConfig,
    source: S,
}

impl Cifar100<DatasetInfo> {
    /// # Errors
    /// Returns `PrepErr::InvalidConfig` if `config` does not validate.
    pub fn new(config: PrepConfig) -> Result<Self> {
        let source = DatasetInfo::cifar100(&config);
        Self::with_source(config, source)
    }
}

impl<S: DatasetSource> Cifar100<S> {
    /// # Errors
    /// Returns `PrepErr::InvalidConfig` if `config` does not validate.
    pub fn with_source(config: PrepConfig, source: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, source })
    }

    pub fn config(&self) -> &PrepConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Downloads and unpacks the archive, skipping whichever step already
    /// happened.
    ///
    /// # Errors
    /// Returns `PrepErr::Transfer` or `PrepErr::Extraction` from the failing
    /// step.
    pub fn download(&self) -> Result<(FetchOutcome, ExtractOutcome)> {
        let mut progress = self.source.progress("download");
        let fetched = Fetcher::from_config(&self.config).fetch(progress.as_mut())?;

        let extracted = Extractor::new(
            self.config.archive_path(),
            &self.config.root,
            self.source.path(),
        )
        .extract()?;

        info!(
            "{} ready at {}",
            self.source.name(),
            self.source.path().display()
        );
        Ok((fetched, extracted))
    }

    /// Loads one raw split straight from the extracted directory.
    pub fn load_batch(&self, split: RawSplit) -> Result<ImageSet> {
        load_split(
            self.source.path(),
            split,
            self.config.image,
            self.source.num_classes(),
        )
    }

    /// Fine label names, indexed by label.
    pub fn label_names(&self) -> Result<Vec<String>> {
        load_label_names(self.source.path())
    }

    /// Writes the train, validation and test records.
    pub fn preprocess_and_save(&self) -> Result<SplitSummary> {
        Preprocessor::new(&self.config, self.source.path(), self.source.num_classes()).run()
    }

    /// Batches over the persisted train split.
    ///
    /// # Args
    /// * `resize` - Resize the whole split to `config.resize_to` before the
    ///   first batch.
    pub fn training_batches(&self, resize: bool) -> Result<BatchIter> {
        let mut train = load_record(&self.config.train_path())?;
        if resize {
            train = self.resized(train)?;
        }
        Ok(BatchIter::new(train, self.config.batch_size))
    }

    /// The persisted validation split, always resized to `config.resize_to`.
    pub fn valid_set(&self) -> Result<ImageSet> {
        let valid = load_record(&self.config.valid_path())?;
        self.resized(valid)
    }

    /// The persisted test split, as stored.
    pub fn test_set(&self) -> Result<ImageSet> {
        load_record(&self.config.test_path())
    }

    fn resized(&self, set: ImageSet) -> Result<ImageSet> {
        let features = resize_images(set.features().view(), self.config.resize_to)?;
        let (_, labels) = set.into_parts();
        ImageSet::new(features, labels)
    }
}
