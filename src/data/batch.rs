use std::path::Path;

use log::{debug, info};
use ndarray::Array4;

use super::dataset::ImageSet;
use crate::{
    config::ImageDims,
    error::{PrepErr, Result},
    pickle::{self, numpy::DType, NdArray, Value},
};

/// A raw record file inside the extracted directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSplit {
    Train,
    Test,
}

impl RawSplit {
    pub fn file_name(self) -> &'static str {
        match self {
            RawSplit::Train => "train",
            RawSplit::Test => "test",
        }
    }
}

/// Loads a whole raw split into memory as channel-last images.
///
/// # Args
/// * `dir` - The extracted dataset directory.
/// * `split` - Which record file to read.
/// * `dims` - Layout of a single stored image.
/// * `num_classes` - Every fine label must be below this.
///
/// # Errors
/// * `PrepErr::Deserialize` if the record is not a pickled mapping holding a
///   `uint8` `data` array and a `fine_labels` list of in-range integers.
/// * `PrepErr::Shape` if the pixel buffer does not divide into whole images or
///   the image and label counts differ.
pub fn load_split(
    dir: &Path,
    split: RawSplit,
    dims: ImageDims,
    num_classes: usize,
) -> Result<ImageSet> {
    let path = dir.join(split.file_name());
    info!("loading {}", path.display());

    let record = pickle::load_file(&path)?;
    let data = field(&record, "data", &path)?;
    let labels = field(&record, "fine_labels", &path)?;

    let array = NdArray::from_value(data).map_err(|e| PrepErr::pickle(&path, e))?;
    if !array.dtype.same_values(&DType::U8) {
        return Err(PrepErr::deserialize(
            &path,
            format!("data has dtype {:?}, expected uint8", array.dtype),
        ));
    }
    if array.fortran_order {
        return Err(PrepErr::deserialize(&path, "data is fortran ordered"));
    }

    let labels = fine_labels(labels, num_classes, &path)?;
    let features = reshape_channel_last(array.data, dims)?;
    debug!(
        "{}: {} images of {:?}",
        split.file_name(),
        features.len_of(ndarray::Axis(0)),
        dims
    );

    ImageSet::new(features, labels)
}

/// Reads `fine_label_names` from the `meta` record.
///
/// # Errors
/// Returns `PrepErr::Deserialize` if the record lacks the list or holds a
/// non-string entry.
pub fn load_label_names(dir: &Path) -> Result<Vec<String>> {
    let path = dir.join("meta");
    let meta = pickle::load_file(&path)?;
    let names = field(&meta, "fine_label_names", &path)?
        .as_seq()
        .ok_or_else(|| PrepErr::deserialize(&path, "fine_label_names is not a list"))?;

    names
        .iter()
        .map(|name| {
            name.as_text()
                .map(|s| s.into_owned())
                .ok_or_else(|| PrepErr::deserialize(&path, "label name is not a string"))
        })
        .collect()
}

/// Reinterprets a flat channel-first buffer as `(N, C, H, W)` and permutes it
/// into standard layout `(N, H, W, C)`.
///
/// # Errors
/// Returns `PrepErr::Shape` if `buf` is not a whole number of images.
pub fn reshape_channel_last(buf: Vec<u8>, dims: ImageDims) -> Result<Array4<u8>> {
    let pixels = dims.pixels();
    if pixels == 0 || buf.len() % pixels != 0 {
        return Err(PrepErr::Shape {
            what: "pixel buffer length modulo image size",
            got: buf.len() % pixels.max(1),
            expected: 0,
        });
    }

    let n = buf.len() / pixels;
    let len = buf.len();
    let chw = Array4::from_shape_vec((n, dims.channels, dims.height, dims.width), buf).map_err(
        |_| PrepErr::Shape {
            what: "pixel buffer",
            got: len,
            expected: n * pixels,
        },
    )?;

    Ok(chw
        .permuted_axes([0, 2, 3, 1])
        .as_standard_layout()
        .into_owned())
}

/// Inverse of [`reshape_channel_last`].
pub fn flatten_channel_first(images: &Array4<u8>) -> Vec<u8> {
    images
        .view()
        .permuted_axes([0, 3, 1, 2])
        .iter()
        .copied()
        .collect()
}

fn field<'v>(record: &'v Value, key: &str, path: &Path) -> Result<&'v Value> {
    record
        .get(key)
        .ok_or_else(|| PrepErr::deserialize(path, format!("missing key {key:?}")))
}

fn fine_labels(value: &Value, num_classes: usize, path: &Path) -> Result<Vec<u8>> {
    let items = value
        .as_seq()
        .ok_or_else(|| PrepErr::deserialize(path, "fine_labels is not a list"))?;

    items
        .iter()
        .map(|item| {
            let label = item
                .as_int()
                .ok_or_else(|| PrepErr::deserialize(path, "fine label is not an integer"))?;
            usize::try_from(label)
                .ok()
                .filter(|&l| l < num_classes)
                .and_then(|l| u8::try_from(l).ok())
                .ok_or_else(|| {
                    PrepErr::deserialize(
                        path,
                        format!("fine label {label} outside [0, {num_classes})"),
                    )
                })
        })
        .collect()
}
