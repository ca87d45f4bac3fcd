// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lidar point clouds: binary decoding and range filtering.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::misc::type_aliases::{Float, Point3};

/// Points outside of `[-RANGE_LIMIT, RANGE_LIMIT]` meters on any axis are discarded.
pub const RANGE_LIMIT: Float = 100.0;

/// A point cloud with one scalar feature per point
/// (ones, or the lidar intensity).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    pub points: Vec<Point3>,
    pub features: Vec<Float>,
}

impl PointCloud {
    /// Point cloud with all features set to one.
    pub fn from_points(points: Vec<Point3>) -> PointCloud {
        let features = vec![1.0; points.len()];
        PointCloud { points, features }
    }

    /// Decode a headerless buffer of little endian `(x, y, z, intensity)` f32 records.
    /// Intensity becomes the point feature if `keep_intensity`, otherwise features are ones.
    pub fn from_bin(bytes: &[u8], keep_intensity: bool) -> Result<PointCloud, String> {
        const RECORD_SIZE: usize = 4 * std::mem::size_of::<f32>();
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(format!(
                "Point cloud buffer of {} bytes is not a multiple of {}",
                bytes.len(),
                RECORD_SIZE
            ));
        }
        let mut values = vec![0.0; bytes.len() / 4];
        Cursor::new(bytes)
            .read_f32_into::<LittleEndian>(&mut values)
            .map_err(|e| e.to_string())?;

        let nb_points = values.len() / 4;
        let mut points = Vec::with_capacity(nb_points);
        let mut features = Vec::with_capacity(nb_points);
        for record in values.chunks_exact(4) {
            points.push(Point3::new(record[0], record[1], record[2]));
            features.push(if keep_intensity { record[3] } else { 1.0 });
        }
        Ok(PointCloud { points, features })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep only points (and their features) where `keep` is true.
    pub fn retain_mask(self, keep: &[bool]) -> PointCloud {
        debug_assert_eq!(keep.len(), self.points.len());
        let (points, features) = self
            .points
            .into_iter()
            .zip(self.features)
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(pf, _)| pf)
            .unzip();
        PointCloud { points, features }
    }

    /// Discard points with any coordinate outside of `[-100, 100]`,
    /// and, if given, points whose norm is not below `max_distance`.
    pub fn filter_range(self, max_distance: Option<Float>) -> PointCloud {
        let keep: Vec<bool> = self
            .points
            .iter()
            .map(|p| {
                p.coords.iter().all(|c| -RANGE_LIMIT <= *c && *c <= RANGE_LIMIT)
                    && max_distance.map_or(true, |d| p.coords.norm() < d)
            })
            .collect();
        self.retain_mask(&keep)
    }
}

// TESTS #############################################################
