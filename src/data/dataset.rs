use ndarray::{s, Array4, ArrayView4, Axis};

use crate::error::{PrepErr, Result};

/// Channel-last images with one fine label per image.
///
/// Invariant: `features.len_of(Axis(0)) == labels.len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    features: Array4<u8>,
    labels: Vec<u8>,
}

impl ImageSet {
    /// # Errors
    /// Returns `PrepErr::Shape` if the number of images and labels differ.
    pub fn new(features: Array4<u8>, labels: Vec<u8>) -> Result<Self> {
        let images = features.len_of(Axis(0));
        if images != labels.len() {
            return Err(PrepErr::Shape {
                what: "labels",
                got: labels.len(),
                expected: images,
            });
        }
        Ok(Self { features, labels })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(N, height, width, channels)`.
    #[inline]
    pub fn features(&self) -> &Array4<u8> {
        &self.features
    }

    #[inline]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// `(height, width, channels)` of every image.
    pub fn image_dims(&self) -> (usize, usize, usize) {
        let (_, h, w, c) = self.features.dim();
        (h, w, c)
    }

    pub fn into_parts(self) -> (Array4<u8>, Vec<u8>) {
        (self.features, self.labels)
    }

    /// Splits into `[0, at)` and `[at, len)`. `at` is clamped to `len`.
    pub fn split_at(self, at: usize) -> (ImageSet, ImageSet) {
        let at = at.min(self.len());
        let head = ImageSet {
            features: self.features.slice(s![..at, .., .., ..]).to_owned(),
            labels: self.labels[..at].to_vec(),
        };
        let tail = ImageSet {
            features: self.features.slice(s![at.., .., .., ..]).to_owned(),
            labels: self.labels[at..].to_vec(),
        };
        (head, tail)
    }
}

/// An owned batch of images and their labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: Array4<u8>,
    pub labels: Vec<u8>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Borrowed batch view (zero-copy).
#[derive(Debug, Clone, Copy)]
pub struct BatchRef<'a> {
    pub features: ArrayView4<'a, u8>,
    pub labels: &'a [u8],
}

impl BatchRef<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn to_batch(&self) -> Batch {
        Batch {
            features: self.features.to_owned(),
            labels: self.labels.to_vec(),
        }
    }
}
