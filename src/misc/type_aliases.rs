// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Type aliases for common types used all over the code base.

use nalgebra as na;

/// Point clouds, images and calibration are f32.
/// Trajectory distances are computed in f64.
pub type Float = f32;

/// A point with two Float coordinates (pixel coordinates).
pub type Point2 = na::Point2<Float>;
/// A point with three Float coordinates.
pub type Point3 = na::Point3<Float>;

/// A vector with three Float coordinates.
pub type Vec3 = na::Vector3<Float>;

/// A 4x4 matrix of Floats.
pub type Mat4 = na::Matrix4<Float>;

/// A 3D rotation.
pub type Rot3 = na::UnitQuaternion<Float>;

/// Semantic label id of a mask pixel.
pub type Label = u16;

/// Single channel label image, one row per image line.
pub type LabelMap = na::DMatrix<Label>;
