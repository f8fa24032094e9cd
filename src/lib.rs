pub mod cifar100;
pub mod config;
pub mod data;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pickle;
pub mod source;

pub use cifar100::Cifar100;
pub use config::{ImageDims, PrepConfig, Resolution};
pub use data::{Batch, BatchIter, BatchRef, ImageSet, RawSplit, SplitSummary};
pub use error::{PrepErr, Result};
pub use extract::{ExtractOutcome, Extractor};
pub use fetch::{FetchOutcome, Fetcher};
pub use source::{DatasetInfo, DatasetSource, LogProgress, ProgressReporter};
