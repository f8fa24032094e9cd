use std::path::{Path, PathBuf};

use log::info;

use crate::config::PrepConfig;

/// Receives byte counts while a transfer is in flight.
pub trait ProgressReporter {
    /// Called once before the first chunk. `total` is known only when the
    /// remote end advertises a length.
    fn start(&mut self, total: Option<u64>);

    /// Called after every chunk with the cumulative number of bytes moved.
    fn advance(&mut self, transferred: u64);

    /// Called once after the last chunk.
    fn finish(&mut self, transferred: u64);
}

/// Static facts about a dataset plus the way it reports progress.
pub trait DatasetSource {
    fn name(&self) -> &str;

    /// Directory the raw records live in once extracted.
    fn path(&self) -> &Path;

    fn num_classes(&self) -> usize;

    /// Number of raw training record files.
    fn num_batches(&self) -> usize;

    fn progress(&self, label: &str) -> Box<dyn ProgressReporter>;
}

/// The CIFAR-100 source: a single raw training batch, 100 fine classes.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    name: String,
    path: PathBuf,
    num_classes: usize,
    num_batches: usize,
}

impl DatasetInfo {
    pub fn new<P: Into<PathBuf>>(
        name: &str,
        path: P,
        num_classes: usize,
        num_batches: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            num_classes,
            num_batches,
        }
    }

    /// Describes CIFAR-100 as laid out by `config`.
    pub fn cifar100(config: &PrepConfig) -> Self {
        Self::new("Cifar-100", config.extract_path(), config.num_classes, 1)
    }
}

impl DatasetSource for DatasetInfo {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_batches(&self) -> usize {
        self.num_batches
    }

    fn progress(&self, label: &str) -> Box<dyn ProgressReporter> {
        Box::new(LogProgress::new(format!("{} {label}", self.name)))
    }
}

/// Reports progress through `log`, at most once per `step` percent (or per
/// `STEP_BYTES` when the total is unknown).
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    total: Option<u64>,
    step: u64,
    next_report: u64,
}

const STEP_BYTES: u64 = 16 * 1024 * 1024;

impl LogProgress {
    pub fn new(label: String) -> Self {
        Self {
            label,
            total: None,
            step: STEP_BYTES,
            next_report: STEP_BYTES,
        }
    }
}

impl ProgressReporter for LogProgress {
    fn start(&mut self, total: Option<u64>) {
        self.total = total;
        self.step = match total {
            Some(total) => (total / 10).max(1),
            None => STEP_BYTES,
        };
        self.next_report = self.step;
        match total {
            Some(total) => info!("{}: downloading {total} bytes", self.label),
            None => info!("{}: downloading (size unknown)", self.label),
        }
    }

    fn advance(&mut self, transferred: u64) {
        if transferred < self.next_report {
            return;
        }
        while self.next_report <= transferred {
            self.next_report += self.step;
        }
        match self.total {
            Some(total) if total > 0 => info!(
                "{}: {transferred}/{total} bytes ({}%)",
                self.label,
                transferred * 100 / total
            ),
            _ => info!("{}: {transferred} bytes", self.label),
        }
    }

    fn finish(&mut self, transferred: u64) {
        info!("{}: done, {transferred} bytes", self.label);
    }
}
