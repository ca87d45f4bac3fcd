// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Calibration file of the cameras of a dataset.
//!
//! Plain text, one entry per line, `#` starts a comment line:
//!
//! ```text
//! intrinsics <camera> <width> <height> <fx> <fy> <cx> <cy> <k1> <k2> <p1> <p2> <k3>
//! extrinsics <camera> <r00> <r01> <r02> <t0> <r10> <r11> <r12> <t1> <r20> <r21> <r22> <t2>
//! ```
//!
//! Extrinsics are the first three rows of the lidar to camera transformation.

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::camera::{
    CalibrationSet, CameraCalibration, CameraId, Distortion, Extrinsics, Intrinsics,
};
use crate::error::{Error, Result};
use crate::misc::type_aliases::{Float, Mat4};

/// One parsed line of the calibration file.
#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Intrinsics(Intrinsics),
    Extrinsics(Extrinsics),
}

/// Read and parse a calibration file.
pub fn read(path: &Path) -> Result<CalibrationSet> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::sample_read(path, e))?;
    parse(&content)
}

/// Parse the content of a calibration file.
pub fn parse(file_content: &str) -> Result<CalibrationSet> {
    let mut intrinsics = BTreeMap::new();
    let mut extrinsics = BTreeMap::new();
    for (line_nb, line) in file_content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (camera, entry) = match parse::entry(line) {
            Ok((_, parsed)) => parsed,
            Err(_) => {
                return Err(Error::CalibrationParse(format!(
                    "Line {}: {:?}",
                    line_nb + 1,
                    line
                )))
            }
        };
        let camera: CameraId = camera.parse().map_err(|_| {
            Error::CalibrationParse(format!("Line {}: unknown camera {}", line_nb + 1, camera))
        })?;
        match entry {
            Entry::Intrinsics(i) => {
                intrinsics.insert(camera, i);
            }
            Entry::Extrinsics(e) => {
                extrinsics.insert(camera, e);
            }
        }
    }

    let mut cameras = BTreeMap::new();
    for (camera, intrinsics) in intrinsics {
        let extrinsics = extrinsics.remove(&camera).ok_or_else(|| {
            Error::CalibrationParse(format!("Camera {} has no extrinsics", camera))
        })?;
        cameras.insert(
            camera,
            CameraCalibration {
                intrinsics,
                extrinsics,
            },
        );
    }
    if let Some(camera) = extrinsics.keys().next() {
        return Err(Error::CalibrationParse(format!(
            "Camera {} has no intrinsics",
            camera
        )));
    }
    Ok(CalibrationSet::new(cameras))
}

/// nom parsers of the calibration entries.
mod parse {
    use super::*;
    use nom::{
        branch::alt,
        bytes::complete::{tag, take_while1},
        character::complete::{space0, space1, u32 as uint},
        combinator::{all_consuming, map},
        multi::count,
        number::complete::float,
        sequence::{preceded, terminated, tuple},
        IResult,
    };

    /// Parse a non comment line into its camera name and entry.
    pub fn entry(input: &str) -> IResult<&str, (&str, Entry)> {
        all_consuming(terminated(alt((intrinsics, extrinsics)), space0))(input)
    }

    fn camera_name(input: &str) -> IResult<&str, &str> {
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
    }

    fn floats<'a>(n: usize) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<Float>> {
        count(preceded(space1, float), n)
    }

    fn intrinsics(input: &str) -> IResult<&str, (&str, Entry)> {
        map(
            tuple((
                preceded(tag("intrinsics"), preceded(space1, camera_name)),
                preceded(space1, uint),
                preceded(space1, uint),
                floats(9),
            )),
            |(camera, width, height, v)| {
                let intrinsics = Intrinsics {
                    principal_point: (v[2], v[3]),
                    focal: (v[0], v[1]),
                    skew: 0.0,
                    distortion: Distortion {
                        k1: v[4],
                        k2: v[5],
                        p1: v[6],
                        p2: v[7],
                        k3: v[8],
                    },
                    image_size: (width as usize, height as usize),
                };
                (camera, Entry::Intrinsics(intrinsics))
            },
        )(input)
    }

    fn extrinsics(input: &str) -> IResult<&str, (&str, Entry)> {
        map(
            tuple((
                preceded(tag("extrinsics"), preceded(space1, camera_name)),
                floats(12),
            )),
            |(camera, v)| {
                let mut m = Mat4::identity();
                for row in 0..3 {
                    for col in 0..4 {
                        m[(row, col)] = v[4 * row + col];
                    }
                }
                (camera, Entry::Extrinsics(Extrinsics::new(m)))
            },
        )(input)
    }
} // mod parse

// TESTS #############################################################
