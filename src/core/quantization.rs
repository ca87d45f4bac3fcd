// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sparse voxel quantization of point clouds,
//! and the batch index prefixed coordinates consumed by sparse convolutions.

use ndarray::{Array2, ArrayView1};
use std::collections::HashMap;

use crate::core::point_cloud::{PointCloud, RANGE_LIMIT};
use crate::misc::type_aliases::Float;

/// Smallest voxel size keeping every coordinate of a range filtered cloud
/// within `i32`, with a factor 2 margin for float rounding.
pub const MIN_QUANTIZATION_SIZE: Float = 2.0 * RANGE_LIMIT / i32::MAX as Float;

/// Integer coordinates of a voxel.
pub type Voxel = [i32; 3];

/// One point cloud after quantization: one entry per occupied voxel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuantizedCloud {
    pub coordinates: Vec<Voxel>,
    pub features: Vec<Float>,
}

impl QuantizedCloud {
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// Snap points to a grid of `quantization_size` cells.
///
/// Voxels are listed in order of first occurrence,
/// features of the points falling in the same voxel are averaged.
/// Points are expected within `RANGE_LIMIT` and the size
/// at least `MIN_QUANTIZATION_SIZE`, otherwise coordinates saturate.
pub fn sparse_quantize(cloud: &PointCloud, quantization_size: Float) -> QuantizedCloud {
    let mut voxel_ids: HashMap<Voxel, usize> = HashMap::with_capacity(cloud.len());
    let mut coordinates = Vec::new();
    let mut sums: Vec<Float> = Vec::new();
    let mut counts: Vec<u32> = Vec::new();

    for (point, feature) in cloud.points.iter().zip(&cloud.features) {
        let voxel = [
            (point.x / quantization_size).floor() as i32,
            (point.y / quantization_size).floor() as i32,
            (point.z / quantization_size).floor() as i32,
        ];
        let id = *voxel_ids.entry(voxel).or_insert_with(|| {
            coordinates.push(voxel);
            sums.push(0.0);
            counts.push(0);
            coordinates.len() - 1
        });
        sums[id] += feature;
        counts[id] += 1;
    }

    let features = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| s / c as Float)
        .collect();
    QuantizedCloud {
        coordinates,
        features,
    }
}

/// Quantized clouds of a whole batch, concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBatch {
    /// `[M, 4]` rows of `[batch_slot, x, y, z]`.
    pub coordinates: Array2<i32>,
    /// `[M, 1]` voxel features.
    pub features: Array2<Float>,
    /// Number of voxels of each batch slot.
    pub counts: Vec<usize>,
}

impl SparseBatch {
    /// Total number of voxels.
    pub fn len(&self) -> usize {
        self.coordinates.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batch slot of each voxel.
    pub fn slots(&self) -> ArrayView1<i32> {
        self.coordinates.column(0)
    }
}

/// Concatenate quantized clouds, prefixing each voxel with its batch slot.
pub fn batched_coordinates(clouds: &[QuantizedCloud]) -> SparseBatch {
    let total = clouds.iter().map(QuantizedCloud::len).sum();
    let mut coordinates = Array2::zeros((total, 4));
    let mut features = Array2::zeros((total, 1));
    let mut row = 0;
    for (slot, cloud) in clouds.iter().enumerate() {
        for (voxel, &feature) in cloud.coordinates.iter().zip(&cloud.features) {
            coordinates[[row, 0]] = slot as i32;
            for (k, &v) in voxel.iter().enumerate() {
                coordinates[[row, k + 1]] = v;
            }
            features[[row, 0]] = feature;
            row += 1;
        }
    }
    SparseBatch {
        coordinates,
        features,
        counts: clouds.iter().map(QuantizedCloud::len).collect(),
    }
}

// TESTS #############################################################
