use std::{collections::HashMap, fs, path::Path};

use log::info;
use ndarray::Array4;
use safetensors::{serialize_to_file, tensor::TensorView, Dtype, SafeTensorError, SafeTensors};

use super::dataset::ImageSet;
use crate::error::{PrepErr, Result};

const FEATURES: &str = "features";
const LABELS: &str = "labels";

/// Persists `set` as a safetensors file with a `features` tensor
/// `(N, H, W, C)` and a `labels` tensor `(N,)`, both `u8`.
///
/// An existing file is overwritten.
///
/// # Errors
/// Returns `PrepErr::Io` if the file cannot be written and
/// `PrepErr::Serialize` if the tensors cannot be encoded.
pub fn save_record(path: &Path, set: &ImageSet, split: &str) -> Result<()> {
    let features = set.features().as_standard_layout();
    let raw = features
        .as_slice()
        .ok_or_else(|| PrepErr::serialize(path, "features are not contiguous"))?;

    let invalid = |e| encode_error(path, e);
    let features = TensorView::new(Dtype::U8, features.shape().to_vec(), raw).map_err(invalid)?;
    let labels = TensorView::new(Dtype::U8, vec![set.len()], set.labels()).map_err(invalid)?;

    let metadata = HashMap::from([
        ("split".to_string(), split.to_string()),
        ("layout".to_string(), "NHWC".to_string()),
    ]);

    serialize_to_file(
        [(FEATURES, features), (LABELS, labels)],
        &Some(metadata),
        path,
    )
    .map_err(invalid)?;

    info!("saved {} {split} records to {}", set.len(), path.display());
    Ok(())
}

fn encode_error(path: &Path, e: SafeTensorError) -> PrepErr {
    match e {
        SafeTensorError::IoError(io) => PrepErr::Io(io),
        other => PrepErr::serialize(path, other),
    }
}

/// Reads a record written by [`save_record`].
///
/// # Errors
/// Returns `PrepErr::Io` if the file cannot be read and
/// `PrepErr::Deserialize` if it is not a well-formed record.
pub fn load_record(path: &Path) -> Result<ImageSet> {
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| PrepErr::deserialize(path, e))?;

    let features = tensors
        .tensor(FEATURES)
        .map_err(|e| PrepErr::deserialize(path, e))?;
    let labels = tensors
        .tensor(LABELS)
        .map_err(|e| PrepErr::deserialize(path, e))?;

    if features.dtype() != Dtype::U8 || labels.dtype() != Dtype::U8 {
        return Err(PrepErr::deserialize(path, "tensors must be u8"));
    }

    let &[n, h, w, c] = features.shape() else {
        return Err(PrepErr::deserialize(
            path,
            format!("features have shape {:?}, expected 4 axes", features.shape()),
        ));
    };
    if labels.shape() != [n] {
        return Err(PrepErr::deserialize(
            path,
            format!("labels have shape {:?}, expected [{n}]", labels.shape()),
        ));
    }

    let features = Array4::from_shape_vec((n, h, w, c), features.data().to_vec())
        .map_err(|e| PrepErr::deserialize(path, e))?;

    ImageSet::new(features, labels.data().to_vec())
}
