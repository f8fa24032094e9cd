use std::num::NonZeroUsize;

use ndarray::s;

use super::dataset::{Batch, BatchRef, ImageSet};

/// Sequential batch cursor over an in-memory split.
///
/// Batches come out in storage order; the last one may be short.
#[derive(Debug, Clone)]
pub struct BatchIter {
    dataset: ImageSet,
    batch_size: usize,
    cursor: usize,
}

impl BatchIter {
    pub fn new(dataset: ImageSet, batch_size: NonZeroUsize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.get(),
            cursor: 0,
        }
    }

    #[inline]
    pub fn dataset(&self) -> &ImageSet {
        &self.dataset
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.cursor < self.dataset.len()
    }

    /// Total batches in one pass: `ceil(len / batch_size)`.
    #[inline]
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next borrowed batch, or None if exhausted.
    pub fn next_batch(&mut self) -> Option<BatchRef<'_>> {
        if !self.has_next() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.dataset.len());
        let features = self
            .dataset
            .features()
            .slice(s![self.cursor..end, .., .., ..]);
        let labels = &self.dataset.labels()[self.cursor..end];

        self.cursor = end;
        Some(BatchRef { features, labels })
    }
}

impl Iterator for BatchIter {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        self.next_batch().map(|batch| batch.to_batch())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.dataset.len() - self.cursor).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for BatchIter {}
