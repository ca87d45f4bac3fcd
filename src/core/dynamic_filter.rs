// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Removal of lidar points hitting dynamic objects (people, cars, ...).
//!
//! Points are projected into each available camera and dropped
//! when they land on a pixel whose semantic label is a dynamic class.

use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::camera::{CalibrationSet, CameraCalibration, CameraId};
use crate::core::point_cloud::PointCloud;
use crate::error::Result;
use crate::misc::type_aliases::{Label, LabelMap};

/// Cityscapes train ids of person, rider, car, truck, bus, train, motorcycle and bicycle.
pub const DEFAULT_DYNAMIC_CLASSES: [Label; 8] = [11, 12, 13, 14, 15, 16, 17, 18];

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicPointFilter {
    dynamic_classes: BTreeSet<Label>,
}

impl Default for DynamicPointFilter {
    fn default() -> Self {
        DynamicPointFilter::new(DEFAULT_DYNAMIC_CLASSES.iter().copied())
    }
}

impl DynamicPointFilter {
    pub fn new<I: IntoIterator<Item = Label>>(dynamic_classes: I) -> DynamicPointFilter {
        DynamicPointFilter {
            dynamic_classes: dynamic_classes.into_iter().collect(),
        }
    }

    pub fn is_dynamic(&self, label: Label) -> bool {
        self.dynamic_classes.contains(&label)
    }

    /// Whether any pixel of the mask is of a dynamic class.
    pub fn has_dynamic_pixels(&self, mask: &LabelMap) -> bool {
        mask.iter().any(|&label| self.is_dynamic(label))
    }

    /// Remove points seen as dynamic by one camera.
    ///
    /// The cloud is returned untouched if it is empty
    /// or if the mask has no dynamic pixel.
    pub fn filter_camera(
        &self,
        cloud: PointCloud,
        mask: &LabelMap,
        calibration: &CameraCalibration,
    ) -> PointCloud {
        if cloud.is_empty() || !self.has_dynamic_pixels(mask) {
            return cloud;
        }
        let (height, width) = mask.shape();
        // Masks may have been resized since calibration.
        let intrinsics = calibration.intrinsics.rescaled(width, height);

        let keep: Vec<bool> = cloud
            .points
            .iter()
            .map(|point| {
                let (pixel, depth) = calibration.project_lidar_point(point, &intrinsics);
                let visible = !pixel.x.is_nan()
                    && !pixel.y.is_nan()
                    && pixel.x >= 0.0
                    && pixel.x < width as f32
                    && pixel.y >= 0.0
                    && pixel.y < height as f32
                    && depth > 0.0;
                !(visible && self.is_dynamic(mask[(pixel.y as usize, pixel.x as usize)]))
            })
            .collect();

        let nb_before = cloud.len();
        let filtered = cloud.retain_mask(&keep);
        debug!(
            "Removed {} dynamic points out of {}",
            nb_before - filtered.len(),
            nb_before
        );
        filtered
    }

    /// Remove points seen as dynamic by any camera having a mask.
    /// Cameras without a mask are skipped, but a camera with a mask must be calibrated.
    pub fn filter(
        &self,
        mut cloud: PointCloud,
        masks: &BTreeMap<CameraId, LabelMap>,
        calibration: &CalibrationSet,
    ) -> Result<PointCloud> {
        for camera in CameraId::ALL.iter() {
            if let Some(mask) = masks.get(camera) {
                cloud = self.filter_camera(cloud, mask, calibration.require(*camera)?);
            }
        }
        Ok(cloud)
    }
}

// TESTS #############################################################
