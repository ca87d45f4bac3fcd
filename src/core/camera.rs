// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera calibration: pinhole intrinsics with distortion,
//! lidar to camera extrinsics, and the immutable set of all calibrated cameras.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::misc::type_aliases::{Float, Mat4, Point2, Point3};

/// Cameras of the robot platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CameraId {
    FrontCam,
    BackCam,
}

impl CameraId {
    /// All cameras, in filtering order.
    pub const ALL: [CameraId; 2] = [CameraId::FrontCam, CameraId::BackCam];

    /// Name used in directories, manifest columns and batch keys.
    pub fn name(self) -> &'static str {
        match self {
            CameraId::FrontCam => "front_cam",
            CameraId::BackCam => "back_cam",
        }
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CameraId {
    type Err = Error;
    fn from_str(s: &str) -> Result<CameraId> {
        match s {
            "front_cam" => Ok(CameraId::FrontCam),
            "back_cam" => Ok(CameraId::BackCam),
            _ => Err(Error::UnknownModality(s.to_string())),
        }
    }
}

// INTRINSICS ##############################################

/// Radial and tangential distortion coefficients, `(k1, k2, p1, p2, k3)` order.
#[derive(PartialEq, Debug, Clone, Copy, Default)]
pub struct Distortion {
    pub k1: Float,
    pub k2: Float,
    pub p1: Float,
    pub p2: Float,
    pub k3: Float,
}

impl Distortion {
    /// Apply the distortion model to normalized image coordinates.
    pub fn distort(&self, x: Float, y: Float) -> (Float, Float) {
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xy = x * y;
        (
            x * radial + 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy,
        )
    }
}

/// Intrinsic parameters of a pinhole camera with distortion,
/// valid for images of the given `(width, height)`.
#[derive(PartialEq, Debug, Clone)]
pub struct Intrinsics {
    pub principal_point: (Float, Float),
    pub focal: (Float, Float),
    pub skew: Float,
    pub distortion: Distortion,
    pub image_size: (usize, usize),
}

impl Intrinsics {
    /// Intrinsics of the same camera for images resized to `(width, height)`.
    /// Pixel centers are kept aligned, as in `(cx + 0.5) * scale - 0.5`.
    pub fn rescaled(&self, width: usize, height: usize) -> Intrinsics {
        let (w, h) = self.image_size;
        if (w, h) == (width, height) {
            return self.clone();
        }
        let sx = width as Float / w as Float;
        let sy = height as Float / h as Float;
        let (cx, cy) = self.principal_point;
        let (fx, fy) = self.focal;
        Intrinsics {
            principal_point: ((cx + 0.5) * sx - 0.5, (cy + 0.5) * sy - 0.5),
            focal: (fx * sx, fy * sy),
            skew: self.skew * sx,
            distortion: self.distortion,
            image_size: (width, height),
        }
    }

    /// Project a point given in the camera frame to pixel coordinates.
    ///
    /// Points with a zero depth project to non finite coordinates,
    /// it is the caller's job to discard them.
    pub fn project(&self, point: &Point3) -> Point2 {
        let x = point.x / point.z;
        let y = point.y / point.z;
        let (xd, yd) = self.distortion.distort(x, y);
        Point2::new(
            self.focal.0 * xd + self.skew * yd + self.principal_point.0,
            self.focal.1 * yd + self.principal_point.1,
        )
    }
}

// EXTRINSICS ##############################################

/// Rigid transformation from the lidar frame to a camera frame,
/// as a 4x4 homogeneous matrix.
#[derive(PartialEq, Debug, Clone)]
pub struct Extrinsics {
    pub lidar_to_camera: Mat4,
}

impl Extrinsics {
    pub fn new(lidar_to_camera: Mat4) -> Extrinsics {
        Extrinsics { lidar_to_camera }
    }

    /// Transform a lidar point into the camera frame.
    pub fn transform(&self, point: &Point3) -> Point3 {
        let h = self.lidar_to_camera * point.to_homogeneous();
        Point3::new(h.x / h.w, h.y / h.w, h.z / h.w)
    }
}

// CALIBRATION SET #########################################

/// Full calibration of one camera.
#[derive(PartialEq, Debug, Clone)]
pub struct CameraCalibration {
    pub intrinsics: Intrinsics,
    pub extrinsics: Extrinsics,
}

impl CameraCalibration {
    /// Project a lidar point to the pixel coordinates of an image of `(width, height)`.
    /// Also returns the depth of the point in the camera frame.
    pub fn project_lidar_point(&self, point: &Point3, intrinsics: &Intrinsics) -> (Point2, Float) {
        let in_camera = self.extrinsics.transform(point);
        (intrinsics.project(&in_camera), in_camera.z)
    }
}

/// Immutable calibration of all cameras, keyed by camera.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct CalibrationSet {
    cameras: BTreeMap<CameraId, CameraCalibration>,
}

impl CalibrationSet {
    pub fn new(cameras: BTreeMap<CameraId, CameraCalibration>) -> CalibrationSet {
        CalibrationSet { cameras }
    }

    pub fn get(&self, camera: CameraId) -> Option<&CameraCalibration> {
        self.cameras.get(&camera)
    }

    /// Same as `get` but missing calibration is an error.
    pub fn require(&self, camera: CameraId) -> Result<&CameraCalibration> {
        self.get(camera)
            .ok_or_else(|| Error::MissingCalibration(camera.to_string()))
    }
}

// TESTS #############################################################
