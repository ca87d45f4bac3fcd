// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Positive and non-negative relations between trajectory poses.
//!
//! Two elements are positives when they are closer than the positive threshold
//! (the element itself excluded), and non-negatives when they are closer than
//! the negative threshold (the element itself included).
//! Both comparisons are strict: a pair exactly at a threshold distance
//! is neither positive nor non-negative.
//! Positives are always non-negatives, even with a positive threshold
//! above the negative one.

use log::{info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Index of positives and non-negatives of every element of a dataset.
/// Built once, read only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialIndex {
    positives: Vec<Vec<usize>>,
    nonnegatives: Vec<Vec<usize>>,
}

/// Full matrix of pairwise euclidean distances between rows of `positions`.
pub fn distance_matrix(positions: &DMatrix<f64>) -> DMatrix<f64> {
    let n = positions.nrows();
    DMatrix::from_fn(n, n, |i, j| (positions.row(i) - positions.row(j)).norm())
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    // Also rejects NaN.
    if value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "{} must be non-negative, but {} given",
            name, value
        )))
    }
}

impl SpatialIndex {
    /// Build the index over positions given one per row (2D or 3D).
    ///
    /// `j` is a positive of `i` when `0 < d(i, j) < positive_threshold`,
    /// and also `d(i, j) < negative_threshold`, so positives are always non-negatives
    /// even with `positive_threshold > negative_threshold`.
    /// `j` is a non-negative of `i`, itself included, when `d(i, j) < negative_threshold`.
    pub fn build(
        positions: &DMatrix<f64>,
        positive_threshold: f64,
        negative_threshold: f64,
    ) -> Result<SpatialIndex> {
        check_threshold("positive_threshold", positive_threshold)?;
        check_threshold("negative_threshold", negative_threshold)?;
        if positive_threshold >= negative_threshold {
            warn!(
                "positive_threshold {} is not below negative_threshold {}",
                positive_threshold, negative_threshold
            );
        }

        let distances = distance_matrix(positions);
        let n = distances.nrows();
        let (positives, nonnegatives) = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = distances.row(i);
                let positives: Vec<usize> = (0..n)
                    .filter(|&j| {
                        row[j] > 0.0 && row[j] < positive_threshold && row[j] < negative_threshold
                    })
                    .collect();
                let nonnegatives: Vec<usize> =
                    (0..n).filter(|&j| row[j] < negative_threshold).collect();
                (positives, nonnegatives)
            })
            .unzip();

        info!(
            "Spatial index built over {} elements (positive < {}, non-negative < {})",
            n, positive_threshold, negative_threshold
        );
        Ok(SpatialIndex {
            positives,
            nonnegatives,
        })
    }

    /// Number of indexed elements.
    pub fn len(&self) -> usize {
        self.positives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positives.is_empty()
    }

    /// Sorted positives of element `i`, never containing `i`.
    pub fn positives(&self, i: usize) -> &[usize] {
        &self.positives[i]
    }

    /// Sorted non-negatives of element `i`, containing `i`.
    pub fn nonnegatives(&self, i: usize) -> &[usize] {
        &self.nonnegatives[i]
    }

    pub fn is_positive(&self, anchor: usize, other: usize) -> bool {
        self.positives[anchor].binary_search(&other).is_ok()
    }

    /// Whether `other` can be used as a negative of `anchor`.
    pub fn is_negative(&self, anchor: usize, other: usize) -> bool {
        self.nonnegatives[anchor].binary_search(&other).is_err()
    }

    /// Positives and negatives masks restricted to the given elements:
    /// `positives[(a, b)]` tells if `indices[b]` is a positive of `indices[a]`.
    pub fn masks(&self, indices: &[usize]) -> (DMatrix<bool>, DMatrix<bool>) {
        let k = indices.len();
        let positives = DMatrix::from_fn(k, k, |a, b| self.is_positive(indices[a], indices[b]));
        let negatives = DMatrix::from_fn(k, k, |a, b| self.is_negative(indices[a], indices[b]));
        (positives, negatives)
    }

    /// Positives mask over the whole dataset.
    pub fn positives_mask(&self) -> DMatrix<bool> {
        let all: Vec<usize> = (0..self.len()).collect();
        self.masks(&all).0
    }

    /// Negatives mask over the whole dataset,
    /// `negatives_mask[(i, j)]` is `distance(i, j) >= negative_threshold`.
    pub fn negatives_mask(&self) -> DMatrix<bool> {
        let all: Vec<usize> = (0..self.len()).collect();
        self.masks(&all).1
    }
}

// TESTS #############################################################
