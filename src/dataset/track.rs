// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Multi-sensor place recognition dataset on disk.
//!
//! ```text
//! <root>/<subset>.csv                  manifest
//! <root>/calibration.txt               cameras calibration
//! <base>/<camera>/<ts>.png             camera images
//! <base>/masks/<camera>/<ts>.png       semantic label masks
//! <base>/lidar/<ts>.bin                point clouds
//! <root>/text_labels/<camera>_text_labels.csv, ...
//! ```
//!
//! where `<base>` is `<root>[/<track>][/floor_<floor>]`
//! depending on the `track` and `floor` columns of the manifest.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::config::{DatasetConfig, MiningConfig};
use crate::core::batch::Sample;
use crate::core::camera::{CalibrationSet, CameraId};
use crate::core::dynamic_filter::DynamicPointFilter;
use crate::core::labels::LabelKind;
use crate::core::point_cloud::PointCloud;
use crate::core::spatial_index::SpatialIndex;
use crate::core::transform::{ImageTransform, SemanticTransform};
use crate::dataset::calibration;
use crate::dataset::labels::LabelTable;
use crate::dataset::manifest::{Manifest, Sensor, TrackRecord};
use crate::error::{Error, Result};
use crate::misc::helper;
use crate::misc::type_aliases::LabelMap;

/// Read only dataset of one subset, loading samples by index.
///
/// The spatial index is built when opening the dataset,
/// and the dataset can then be shared by all loading threads.
#[derive(Debug)]
pub struct PlaceRecognitionDataset {
    config: DatasetConfig,
    cameras: Vec<CameraId>,
    load_lidar: bool,
    manifest: Manifest,
    index: SpatialIndex,
    labels: BTreeMap<(LabelKind, CameraId), LabelTable>,
    dynamic_filter: Option<(DynamicPointFilter, CalibrationSet)>,
    image_transform: ImageTransform,
    semantic_transform: SemanticTransform,
}

impl PlaceRecognitionDataset {
    pub fn open(config: &DatasetConfig, mining: &MiningConfig) -> Result<PlaceRecognitionDataset> {
        if !config.root.is_dir() {
            return Err(Error::DatasetNotFound(config.root.clone()));
        }
        if config.exclude_dynamic_classes && !config.load_semantics {
            return Err(Error::InvalidArgument(
                "Excluding dynamic classes requires loading semantics".to_string(),
            ));
        }
        let sensors = config.sensors()?;
        let cameras: Vec<CameraId> = sensors
            .iter()
            .filter_map(|s| match s {
                Sensor::Camera(cam) => Some(*cam),
                Sensor::Lidar => None,
            })
            .collect();
        let load_lidar = sensors.contains(&Sensor::Lidar);

        let manifest = Manifest::read(&config.manifest_path(), &sensors)?;
        info!(
            "Opened {:?} with {} records and sensors {:?}",
            config.manifest_path(),
            manifest.len(),
            config.sensors
        );
        let index = SpatialIndex::build(
            manifest.positions(),
            mining.positive_threshold,
            mining.negative_threshold,
        )?;

        let mut labels = BTreeMap::new();
        for kind in config.label_kinds() {
            for &cam in &cameras {
                let table = LabelTable::read(&config.root, kind, cam)?;
                warn_if_no_join(&table, &manifest, cam);
                labels.insert((kind, cam), table);
            }
        }

        let dynamic_filter = match config.dynamic_filter() {
            Some(filter) if load_lidar => {
                let calibration = calibration::read(&config.calibration_path())?;
                for &cam in &cameras {
                    calibration.require(cam)?;
                }
                Some((filter, calibration))
            }
            _ => None,
        };

        let [width, height] = config.image_size;
        Ok(PlaceRecognitionDataset {
            config: config.clone(),
            cameras,
            load_lidar,
            manifest,
            index,
            labels,
            dynamic_filter,
            image_transform: ImageTransform::new(width, height),
            semantic_transform: SemanticTransform::new(width, height),
        })
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn positives(&self, idx: usize) -> &[usize] {
        self.index.positives(idx)
    }

    pub fn nonnegatives(&self, idx: usize) -> &[usize] {
        self.index.nonnegatives(idx)
    }

    /// Load and transform all enabled modalities of one element.
    pub fn get(&self, idx: usize) -> Result<Sample> {
        let record = self.manifest.record(idx).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Index {} out of a dataset of {} elements",
                idx,
                self.len()
            ))
        })?;
        let base = base_dir(&self.config.root, record);
        let mut sample = Sample::new(idx, record.pose);

        for &cam in &self.cameras {
            let ts = timestamp(record, Sensor::Camera(cam))?;
            let image_path = base.join(cam.name()).join(format!("{}.png", ts));
            let img = image::open(&image_path)
                .map_err(|e| Error::sample_read(&image_path, e))?
                .to_rgb8();
            sample
                .images
                .insert(cam, self.image_transform.apply(&img));

            if self.config.load_semantics {
                let mask_path = base.join("masks").join(cam.name()).join(format!("{}.png", ts));
                let mask = read_mask(&mask_path)?;
                sample.masks.insert(cam, self.semantic_transform.apply(&mask));
            }

            let image_name = format!("{}.png", ts);
            for (&(kind, table_cam), table) in &self.labels {
                if table_cam == cam {
                    sample.labels.insert((kind, cam), table.frame(&image_name));
                }
            }
        }

        if self.load_lidar {
            let ts = timestamp(record, Sensor::Lidar)?;
            let cloud_path = base.join("lidar").join(format!("{}.bin", ts));
            let cloud = self.read_cloud(&cloud_path, &sample.masks)?;
            sample.cloud = Some(cloud);
        }
        Ok(sample)
    }

    fn read_cloud(&self, path: &Path, masks: &BTreeMap<CameraId, LabelMap>) -> Result<PointCloud> {
        let bytes = fs::read(path).map_err(|e| Error::sample_read(path, e))?;
        let raw = PointCloud::from_bin(&bytes, self.config.keep_intensity)
            .map_err(|e| Error::sample_read(path, e))?;
        let nb_raw = raw.len();
        let mut cloud = raw.filter_range(self.config.max_point_distance);
        debug!(
            "{:?}: {} points, {} out of range",
            path,
            nb_raw,
            nb_raw - cloud.len()
        );
        if let Some((filter, calibration)) = &self.dynamic_filter {
            cloud = filter.filter(cloud, masks, calibration)?;
        }
        Ok(cloud)
    }
}

/// Directory of the sensor data of one record.
fn base_dir(root: &Path, record: &TrackRecord) -> PathBuf {
    let mut base = root.to_path_buf();
    if let Some(track) = &record.track {
        base.push(track);
    }
    if let Some(floor) = &record.floor {
        base.push(format!("floor_{}", floor));
    }
    base
}

fn timestamp(record: &TrackRecord, sensor: Sensor) -> Result<i64> {
    record
        .timestamps
        .get(&sensor)
        .copied()
        .ok_or_else(|| Error::Schema(format!("No {} timestamp", sensor)))
}

fn read_mask(path: &Path) -> Result<LabelMap> {
    let file = fs::File::open(path).map_err(|e| Error::sample_read(path, e))?;
    helper::read_label_png(BufReader::new(file)).map_err(|e| Error::sample_read(path, e))
}

fn warn_if_no_join(table: &LabelTable, manifest: &Manifest, cam: CameraId) {
    let sensor = Sensor::Camera(cam);
    let joined = manifest
        .records()
        .iter()
        .filter_map(|r| r.timestamps.get(&sensor))
        .filter(|ts| table.contains(&format!("{}.png", ts)))
        .count();
    if joined == 0 && !manifest.is_empty() {
        warn!(
            "No {:?} label of {} matches a frame of the manifest",
            table.kind(),
            cam
        );
    }
}

// TESTS #############################################################

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use image::{GrayImage, Luma, Rgb, RgbImage};

    const CALIBRATION: &str = "\
# lidar x forward is the camera depth
intrinsics front_cam 16 8 8 8 7.5 3.5 0 0 0 0 0
extrinsics front_cam 0 -1 0 0  0 0 -1 0  1 0 0 0
";

    /// Four places at (0, 0), (1, 0), (20, 0), (100, 0) seen by the front camera and the lidar.
    /// Every cloud has a point in front of the camera, one behind, and one out of range.
    /// Only the first frame has a person filling its mask.
    pub(crate) fn write_dataset(root: &Path) {
        let positions = [0.0, 1.0, 20.0, 100.0];
        let mut csv = String::from(",northing,easting,front_cam_ts,lidar_ts\n");
        for (i, n) in positions.iter().enumerate() {
            csv.push_str(&format!("{},{},0.0,{},{}\n", i, n, 1000 + i, 2000 + i));
        }
        fs::write(root.join("train.csv"), csv).unwrap();
        fs::write(root.join("calibration.txt"), CALIBRATION).unwrap();

        for dir in &["front_cam", "masks/front_cam", "lidar", "text_labels"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for i in 0..positions.len() {
            let img = RgbImage::from_pixel(16, 8, Rgb([255, 128, 0]));
            img.save(root.join("front_cam").join(format!("{}.png", 1000 + i)))
                .unwrap();
            let label = if i == 0 { 11 } else { 0 };
            let mask = GrayImage::from_pixel(16, 8, Luma([label]));
            mask.save(root.join("masks/front_cam").join(format!("{}.png", 1000 + i)))
                .unwrap();

            let mut bin = Vec::new();
            for p in &[[5.0, 0.0, 0.0, 0.3], [-5.0, 0.0, 0.0, 0.6], [0.0, 0.0, 200.0, 0.9]] {
                for v in p.iter() {
                    bin.write_f32::<LittleEndian>(*v).unwrap();
                }
            }
            fs::write(root.join("lidar").join(format!("{}.bin", 2000 + i)), bin).unwrap();
        }
        fs::write(
            root.join("text_labels/front_cam_text_labels.csv"),
            "path,text\n1000.png,EXIT\n1000.png,201\n",
        )
        .unwrap();
    }

    pub(crate) fn small_config(root: &Path) -> DatasetConfig {
        DatasetConfig {
            image_size: [8, 4],
            ..DatasetConfig::new(root)
        }
    }

    fn mining() -> MiningConfig {
        MiningConfig {
            positive_threshold: 5.0,
            negative_threshold: 15.0,
        }
    }

    #[test]
    fn open_builds_the_index() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let dataset = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap();
        assert_eq!(4, dataset.len());
        assert_eq!(&[1], dataset.positives(0));
        assert_eq!(&[0, 1], dataset.nonnegatives(0));
        assert!(dataset.index().is_negative(0, 2));
        assert!(!dataset.index().is_negative(0, 1));
    }

    #[test]
    fn get_loads_image_and_cloud() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let dataset = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap();
        let sample = dataset.get(2).unwrap();
        assert_eq!(2, sample.index);
        assert_eq!(20.0, sample.pose[0]);
        assert_eq!(&[3, 4, 8], sample.images[&CameraId::FrontCam].shape());
        assert!(sample.masks.is_empty());
        // The point at z = 200 is out of range.
        let cloud = sample.cloud.unwrap();
        assert_eq!(2, cloud.len());
        assert_eq!(vec![1.0, 1.0], cloud.features);
    }

    #[test]
    fn intensity_and_max_distance() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let config = DatasetConfig {
            keep_intensity: true,
            max_point_distance: Some(4.0),
            sensors: vec!["lidar".to_string()],
            ..small_config(dir.path())
        };
        let dataset = PlaceRecognitionDataset::open(&config, &mining()).unwrap();
        let sample = dataset.get(0).unwrap();
        assert!(sample.images.is_empty());
        assert!(sample.cloud.unwrap().is_empty());

        let config = DatasetConfig {
            max_point_distance: Some(6.0),
            ..config
        };
        let dataset = PlaceRecognitionDataset::open(&config, &mining()).unwrap();
        let cloud = dataset.get(0).unwrap().cloud.unwrap();
        assert_eq!(vec![0.3, 0.6], cloud.features);
    }

    #[test]
    fn dynamic_points_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let config = DatasetConfig {
            load_semantics: true,
            exclude_dynamic_classes: true,
            ..small_config(dir.path())
        };
        let dataset = PlaceRecognitionDataset::open(&config, &mining()).unwrap();

        let first = dataset.get(0).unwrap();
        assert_eq!((4, 8), first.masks[&CameraId::FrontCam].shape());
        // Only the point behind the camera is left.
        let cloud = first.cloud.unwrap();
        assert_eq!(1, cloud.len());
        assert_eq!(-5.0, cloud.points[0].x);

        // No dynamic pixel, nothing removed.
        assert_eq!(2, dataset.get(1).unwrap().cloud.unwrap().len());
    }

    #[test]
    fn labels_are_joined_on_image_names() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let config = DatasetConfig {
            load_text_labels: true,
            ..small_config(dir.path())
        };
        let dataset = PlaceRecognitionDataset::open(&config, &mining()).unwrap();
        let key = (LabelKind::TextLabels, CameraId::FrontCam);
        let first = dataset.get(0).unwrap();
        assert_eq!(2, first.labels[&key].len());
        assert_eq!(Some("EXIT"), first.labels[&key].get(0, "text"));
        assert!(dataset.get(3).unwrap().labels[&key].is_empty());

        let config = DatasetConfig {
            load_aruco_labels: true,
            ..small_config(dir.path())
        };
        let err = PlaceRecognitionDataset::open(&config, &mining()).unwrap_err();
        assert!(err.is_resource_not_found());
    }

    #[test]
    fn track_and_floor_directories() {
        let record = TrackRecord {
            pose: [0.0; 7],
            timestamps: BTreeMap::new(),
            track: Some("00_2023-02-10".to_string()),
            floor: Some("1".to_string()),
        };
        assert_eq!(
            PathBuf::from("/data/00_2023-02-10/floor_1"),
            base_dir(Path::new("/data"), &record)
        );
    }

    #[test]
    fn missing_resources() {
        let dir = tempfile::tempdir().unwrap();
        let missing_root = small_config(&dir.path().join("nope"));
        let err = PlaceRecognitionDataset::open(&missing_root, &mining()).unwrap_err();
        assert!(match err {
            Error::DatasetNotFound(_) => true,
            _ => false,
        });
        let err = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap_err();
        assert!(match err {
            Error::MissingManifest(_) => true,
            _ => false,
        });

        write_dataset(dir.path());
        fs::remove_file(dir.path().join("lidar/2001.bin")).unwrap();
        let dataset = PlaceRecognitionDataset::open(&small_config(dir.path()), &mining()).unwrap();
        assert!(dataset.get(0).is_ok());
        assert!(match dataset.get(1) {
            Err(Error::SampleRead { path, .. }) => path.ends_with("lidar/2001.bin"),
            _ => false,
        });
        assert!(dataset.get(4).unwrap_err().is_configuration());
    }

    #[test]
    fn invalid_configurations() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path());
        let negative = MiningConfig {
            positive_threshold: -1.0,
            negative_threshold: 15.0,
        };
        assert!(PlaceRecognitionDataset::open(&small_config(dir.path()), &negative)
            .unwrap_err()
            .is_configuration());

        let config = DatasetConfig {
            sensors: vec!["back_cam".to_string()],
            ..small_config(dir.path())
        };
        // The manifest has no back_cam_ts column.
        assert!(match PlaceRecognitionDataset::open(&config, &mining()) {
            Err(Error::Schema(_)) => true,
            _ => false,
        });

        let config = DatasetConfig {
            load_semantics: true,
            exclude_dynamic_classes: true,
            calibration: Some(dir.path().join("other.txt")),
            ..small_config(dir.path())
        };
        assert!(PlaceRecognitionDataset::open(&config, &mining()).is_err());
    }
}
