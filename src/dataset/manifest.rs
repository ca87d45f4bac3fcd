// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Trajectory manifest of a dataset subset: one CSV row per timestamp.
//!
//! Required columns are either `tx,ty,tz,qx,qy,qz,qw`,
//! or `northing,easting` for 2D datasets.
//! Sensor timestamp columns (`front_cam_ts`, `back_cam_ts`, `lidar_ts`)
//! are required for the enabled sensors only.
//! Optional `track` and `floor` columns select sub-directories.

use csv::StringRecord;
use nalgebra::DMatrix;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::core::batch::Pose;
use crate::core::camera::CameraId;
use crate::error::{Error, Result};
use crate::misc::type_aliases::Float;

const POSE_COLUMNS: [&str; 7] = ["tx", "ty", "tz", "qx", "qy", "qz", "qw"];
const UTM_COLUMNS: [&str; 2] = ["northing", "easting"];

/// Sensors of the robot platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sensor {
    Camera(CameraId),
    Lidar,
}

impl Sensor {
    pub fn name(self) -> &'static str {
        match self {
            Sensor::Camera(cam) => cam.name(),
            Sensor::Lidar => "lidar",
        }
    }

    /// Manifest column holding the timestamps of this sensor.
    pub fn timestamp_column(self) -> String {
        format!("{}_ts", self.name())
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sensor {
    type Err = Error;
    fn from_str(s: &str) -> Result<Sensor> {
        match s {
            "lidar" => Ok(Sensor::Lidar),
            _ => s.parse().map(Sensor::Camera),
        }
    }
}

/// One row of the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub pose: Pose,
    pub timestamps: BTreeMap<Sensor, i64>,
    pub track: Option<String>,
    pub floor: Option<String>,
}

/// Immutable content of a manifest file.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    records: Vec<TrackRecord>,
    positions: DMatrix<f64>,
}

struct Columns {
    pose: Option<Vec<usize>>,
    utm: Option<Vec<usize>>,
    timestamps: Vec<(Sensor, usize)>,
    track: Option<usize>,
    floor: Option<usize>,
}

fn find_all(headers: &StringRecord, names: &[&str]) -> Option<Vec<usize>> {
    names
        .iter()
        .map(|name| headers.iter().position(|h| h == *name))
        .collect()
}

fn parse_field<T: FromStr>(record: &StringRecord, col: usize, row: usize) -> Result<T> {
    let raw = record.get(col).unwrap_or("").trim();
    raw.parse().map_err(|_| {
        Error::Schema(format!(
            "Row {}: cannot parse {:?} in column {}",
            row, raw, col
        ))
    })
}

/// Timestamps may have been written as floats (`1676000000123.0`).
fn parse_timestamp(record: &StringRecord, col: usize, row: usize) -> Result<i64> {
    parse_field::<i64>(record, col, row)
        .or_else(|_| parse_field::<f64>(record, col, row).map(|t| t as i64))
}

fn optional_string(record: &StringRecord, col: Option<usize>) -> Option<String> {
    col.and_then(|c| record.get(c))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Manifest {
    /// Read the manifest file, checking that the columns of `sensors` exist.
    pub fn read(path: &Path, sensors: &[Sensor]) -> Result<Manifest> {
        if !path.is_file() {
            return Err(Error::MissingManifest(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Manifest::from_reader(file, sensors)
    }

    pub fn from_reader<R: Read>(reader: R, sensors: &[Sensor]) -> Result<Manifest> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let columns = Columns {
            pose: find_all(&headers, &POSE_COLUMNS),
            utm: find_all(&headers, &UTM_COLUMNS),
            timestamps: sensors
                .iter()
                .map(|&sensor| {
                    let name = sensor.timestamp_column();
                    headers
                        .iter()
                        .position(|h| h == name)
                        .map(|col| (sensor, col))
                        .ok_or_else(|| {
                            Error::Schema(format!("Missing manifest column {:?}", name))
                        })
                })
                .collect::<Result<_>>()?,
            track: headers.iter().position(|h| h == "track"),
            floor: headers.iter().position(|h| h == "floor"),
        };
        if columns.pose.is_none() && columns.utm.is_none() {
            return Err(Error::Schema(format!(
                "Manifest needs either {:?} or {:?} columns",
                POSE_COLUMNS, UTM_COLUMNS
            )));
        }

        let mut records = Vec::new();
        let mut positions = Vec::new();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| match e.kind() {
                csv::ErrorKind::UnequalLengths {
                    expected_len, len, ..
                } => Error::Schema(format!(
                    "Row {}: {} fields instead of {}",
                    row, len, expected_len
                )),
                _ => Error::Csv(e),
            })?;
            let (record, position) = Manifest::parse_record(&columns, &record, row)?;
            records.push(record);
            positions.extend(position);
        }

        let dim = if columns.utm.is_some() { 2 } else { 3 };
        let positions = DMatrix::from_row_slice(records.len(), dim, &positions);
        Ok(Manifest { records, positions })
    }

    fn parse_record(
        columns: &Columns,
        record: &StringRecord,
        row: usize,
    ) -> Result<(TrackRecord, Vec<f64>)> {
        let utm = match &columns.utm {
            Some(cols) => Some(
                cols.iter()
                    .map(|&c| parse_field::<f64>(record, c, row))
                    .collect::<Result<Vec<f64>>>()?,
            ),
            None => None,
        };
        let pose_values = match &columns.pose {
            Some(cols) => Some(
                cols.iter()
                    .map(|&c| parse_field::<f64>(record, c, row))
                    .collect::<Result<Vec<f64>>>()?,
            ),
            None => None,
        };

        let mut pose: Pose = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let position = match (&utm, &pose_values) {
            (_, Some(values)) => {
                for (p, v) in pose.iter_mut().zip(values) {
                    *p = *v as Float;
                }
                utm.clone().unwrap_or_else(|| values[..3].to_vec())
            }
            (Some(ne), None) => {
                pose[0] = ne[0] as Float;
                pose[1] = ne[1] as Float;
                ne.clone()
            }
            (None, None) => unreachable!("checked on headers"),
        };

        let timestamps: BTreeMap<Sensor, i64> = columns
            .timestamps
            .iter()
            .map(|&(sensor, col)| parse_timestamp(record, col, row).map(|ts| (sensor, ts)))
            .collect::<Result<_>>()?;

        Ok((
            TrackRecord {
                pose,
                timestamps,
                track: optional_string(record, columns.track),
                floor: optional_string(record, columns.floor),
            },
            position,
        ))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&TrackRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[TrackRecord] {
        &self.records
    }

    /// Positions used for mining, one row per record:
    /// `northing, easting` when available, `tx, ty, tz` otherwise.
    pub fn positions(&self) -> &DMatrix<f64> {
        &self.positions
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK_CSV: &str = "\
,tx,ty,tz,qx,qy,qz,qw,front_cam_ts,back_cam_ts,lidar_ts
0,0.0,0.0,0.0,0,0,0,1,1000,1001,1002
1,3.0,4.0,0.0,0,0,0,1,2000.0,2001,2002
";

    #[test]
    fn pose_manifest() {
        let sensors = [Sensor::Camera(CameraId::FrontCam), Sensor::Lidar];
        let manifest = Manifest::from_reader(TRACK_CSV.as_bytes(), &sensors).unwrap();
        assert_eq!(2, manifest.len());
        assert_eq!((2, 3), manifest.positions().shape());
        assert_eq!(4.0, manifest.positions()[(1, 1)]);
        let record = manifest.record(1).unwrap();
        assert_eq!(2000, record.timestamps[&Sensor::Camera(CameraId::FrontCam)]);
        assert_eq!(2002, record.timestamps[&Sensor::Lidar]);
        assert_eq!(None, record.track);
        assert_eq!(1.0, record.pose[6]);
    }

    #[test]
    fn utm_manifest() {
        let csv = "\
,northing,easting,lidar_ts,track,floor
0,10.0,20.0,5,2023-02-10,1
";
        let manifest = Manifest::from_reader(csv.as_bytes(), &[Sensor::Lidar]).unwrap();
        assert_eq!((1, 2), manifest.positions().shape());
        let record = manifest.record(0).unwrap();
        assert_eq!([10.0, 20.0, 0.0, 0.0, 0.0, 0.0, 1.0], record.pose);
        assert_eq!(Some("2023-02-10".to_string()), record.track);
        assert_eq!(Some("1".to_string()), record.floor);
    }

    #[test]
    fn missing_columns_are_schema_errors() {
        let back_only =
            Manifest::from_reader(TRACK_CSV.as_bytes(), &[Sensor::Camera(CameraId::BackCam)]);
        assert!(back_only.is_ok());
        let csv = ",tx,ty,tz\n0,1,2,3\n";
        assert!(match Manifest::from_reader(csv.as_bytes(), &[]) {
            Err(Error::Schema(_)) => true,
            _ => false,
        });
        let csv = ",northing,easting\n0,1,2\n";
        assert!(Manifest::from_reader(csv.as_bytes(), &[Sensor::Lidar])
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn malformed_value() {
        let csv = ",northing,easting\n0,abc,2\n";
        assert!(Manifest::from_reader(csv.as_bytes(), &[]).is_err());
    }

    #[test]
    fn short_row_is_a_schema_error() {
        let csv = ",northing,easting,lidar_ts\n0,1.0,2.0,5\n1,3.0\n";
        let err = Manifest::from_reader(csv.as_bytes(), &[Sensor::Lidar]).unwrap_err();
        assert!(err.is_configuration());
        assert!(match err {
            Error::Schema(msg) => msg.starts_with("Row 1:"),
            _ => false,
        });
    }

    #[test]
    fn missing_file() {
        let err = Manifest::read(Path::new("/nonexistent/track.csv"), &[]).unwrap_err();
        assert!(err.is_resource_not_found());
    }

    #[test]
    fn sensor_names() {
        assert_eq!(Sensor::Lidar, "lidar".parse().unwrap());
        assert_eq!("back_cam_ts", Sensor::Camera(CameraId::BackCam).timestamp_column());
        assert!("radar".parse::<Sensor>().is_err());
    }
}
