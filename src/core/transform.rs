// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Deterministic per-sample transforms of images and masks,
//! and the random transform shared by all clouds of a batch.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array3, Axis};
use rand::Rng;
use serde::Deserialize;

use crate::math::so3;
use crate::misc::helper;
use crate::misc::interop;
use crate::misc::type_aliases::{Float, LabelMap, Point3, Rot3, Vec3};

/// ImageNet channel means.
pub const IMAGENET_MEAN: [Float; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const IMAGENET_STD: [Float; 3] = [0.229, 0.224, 0.225];

/// Resize and normalize camera images into `[3, height, width]` arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTransform {
    pub width: u32,
    pub height: u32,
    pub mean: [Float; 3],
    pub std: [Float; 3],
}

impl ImageTransform {
    pub fn new(width: u32, height: u32) -> ImageTransform {
        ImageTransform {
            width,
            height,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn apply(&self, img: &RgbImage) -> Array3<Float> {
        let resized = if img.dimensions() == (self.width, self.height) {
            img.clone()
        } else {
            imageops::resize(img, self.width, self.height, FilterType::Triangle)
        };
        let mut array = interop::array_from_rgb(&resized);
        for (c, mut channel) in array.axis_iter_mut(Axis(0)).enumerate() {
            let (mean, std) = (self.mean[c], self.std[c]);
            channel.mapv_inplace(|v| (v - mean) / std);
        }
        array
    }
}

/// Resize label masks to the geometry of the paired images.
/// Nearest neighbour, so label ids are preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticTransform {
    pub width: u32,
    pub height: u32,
}

impl SemanticTransform {
    pub fn new(width: u32, height: u32) -> SemanticTransform {
        SemanticTransform { width, height }
    }

    pub fn apply(&self, mask: &LabelMap) -> LabelMap {
        helper::resize_nearest(mask, self.width as usize, self.height as usize)
    }
}

/// Random rotation drawn once per batch and applied identically to every cloud.
///
/// Yaw is uniform in `[-max_yaw, max_yaw]`, roll and pitch in `[-max_tilt, max_tilt]`,
/// all three forming the axis-angle vector of the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CloudSetTransform {
    pub max_yaw: Float,
    #[serde(default)]
    pub max_tilt: Float,
}

impl CloudSetTransform {
    pub fn sample_rotation<R: Rng>(&self, rng: &mut R) -> Rot3 {
        let tilt = self.max_tilt.abs();
        let yaw = self.max_yaw.abs();
        so3::exp(Vec3::new(
            rng.gen_range(-tilt..=tilt),
            rng.gen_range(-tilt..=tilt),
            rng.gen_range(-yaw..=yaw),
        ))
    }

    /// Rotate all points in place with a single sampled rotation.
    pub fn apply<R: Rng>(&self, points: &mut [Point3], rng: &mut R) {
        let rotation = self.sample_rotation(rng);
        for p in points.iter_mut() {
            *p = rotation * *p;
        }
    }
}

// TESTS #############################################################
