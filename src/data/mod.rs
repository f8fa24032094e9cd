pub mod batch;
pub mod dataloader;
pub mod dataset;
pub mod record;
pub mod resize;
pub mod split;

pub use batch::{flatten_channel_first, load_label_names, load_split, reshape_channel_last, RawSplit};
pub use dataloader::BatchIter;
pub use dataset::{Batch, BatchRef, ImageSet};
pub use record::{load_record, save_record};
pub use resize::resize_images;
pub use split::{split_off_validation, validation_cut, Preprocessor, SplitSummary};
