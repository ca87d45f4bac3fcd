// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! TOML configuration of the data pipeline.
//!
//! ```toml
//! [dataset]
//! root = "/data/itlp"
//! subset = "train"
//! sensors = ["front_cam", "back_cam", "lidar"]
//! load_semantics = true
//! exclude_dynamic_classes = true
//!
//! [mining]
//! positive_threshold = 10.0
//! negative_threshold = 50.0
//!
//! [batching]
//! batch_size = 32
//! val_batch_size = 64
//! shuffle = true
//! seed = 42
//! set_transform = { max_yaw = 3.14, max_tilt = 0.05 }
//! ```
//!
//! Every field has a default except `dataset.root`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::batch::BatchAssembler;
use crate::core::dynamic_filter::{DynamicPointFilter, DEFAULT_DYNAMIC_CLASSES};
use crate::core::labels::LabelKind;
use crate::core::quantization::MIN_QUANTIZATION_SIZE;
use crate::core::transform::CloudSetTransform;
use crate::dataset::loader::BatchSampler;
use crate::dataset::manifest::Sensor;
use crate::error::{Error, Result};
use crate::misc::type_aliases::{Float, Label};

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
}

impl FromStr for Config {
    type Err = Error;
    fn from_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Read, parse and validate a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        std::fs::read_to_string(path)?.parse()
    }

    /// Reject values that cannot give a meaningful pipeline.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidArgument(msg));
        if self.dataset.root.as_os_str().is_empty() {
            return invalid("dataset.root is required".to_string());
        }
        let MiningConfig {
            positive_threshold,
            negative_threshold,
        } = self.mining;
        if !(positive_threshold >= 0.0) || !(negative_threshold >= 0.0) {
            return invalid(format!(
                "Thresholds must be non-negative, got {} and {}",
                positive_threshold, negative_threshold
            ));
        }
        if !(self.batching.quantization_size >= MIN_QUANTIZATION_SIZE) {
            return invalid(format!(
                "batching.quantization_size must be at least {:e}, got {}",
                MIN_QUANTIZATION_SIZE, self.batching.quantization_size
            ));
        }
        if self.batching.batch_size == 0 || self.batching.val_batch_size == Some(0) {
            return invalid("batching batch sizes must be positive".to_string());
        }
        if self.dataset.exclude_dynamic_classes && !self.dataset.load_semantics {
            return invalid(
                "dataset.exclude_dynamic_classes requires dataset.load_semantics".to_string(),
            );
        }
        if self.dataset.image_size.iter().any(|&s| s == 0) {
            return invalid(format!(
                "dataset.image_size must be positive, got {:?}",
                self.dataset.image_size
            ));
        }
        self.dataset.sensors().map(|_| ())
    }
}

// DATASET ###################################################

/// Subset of a dataset, each one with its own manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subset {
    Train,
    Val,
    Test,
    Track,
}

impl Subset {
    pub fn manifest_name(self) -> &'static str {
        match self {
            Subset::Train => "train.csv",
            Subset::Val => "val.csv",
            Subset::Test => "test.csv",
            Subset::Track => "track.csv",
        }
    }
}

impl Default for Subset {
    fn default() -> Self {
        Subset::Train
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub subset: Subset,
    /// Sensor names: `front_cam`, `back_cam`, `lidar`.
    pub sensors: Vec<String>,
    pub load_semantics: bool,
    pub load_text_descriptions: bool,
    pub load_text_labels: bool,
    pub load_aruco_labels: bool,
    /// Points farther than this (meters) are discarded.
    pub max_point_distance: Option<Float>,
    pub keep_intensity: bool,
    pub exclude_dynamic_classes: bool,
    pub dynamic_classes: Vec<Label>,
    /// `[width, height]` of images and masks.
    pub image_size: [u32; 2],
    /// Defaults to `<root>/calibration.txt`.
    pub calibration: Option<PathBuf>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            root: PathBuf::new(),
            subset: Subset::default(),
            sensors: vec!["front_cam".to_string(), "lidar".to_string()],
            load_semantics: false,
            load_text_descriptions: false,
            load_text_labels: false,
            load_aruco_labels: false,
            max_point_distance: None,
            keep_intensity: false,
            exclude_dynamic_classes: false,
            dynamic_classes: DEFAULT_DYNAMIC_CLASSES.to_vec(),
            image_size: [320, 192],
            calibration: None,
        }
    }
}

impl DatasetConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> DatasetConfig {
        DatasetConfig {
            root: root.into(),
            ..DatasetConfig::default()
        }
    }

    /// Parsed sensors, without duplicates, in configuration order.
    pub fn sensors(&self) -> Result<Vec<Sensor>> {
        let mut sensors: Vec<Sensor> = Vec::with_capacity(self.sensors.len());
        for name in &self.sensors {
            let sensor = name.parse()?;
            if !sensors.contains(&sensor) {
                sensors.push(sensor);
            }
        }
        Ok(sensors)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(self.subset.manifest_name())
    }

    pub fn calibration_path(&self) -> PathBuf {
        self.calibration
            .clone()
            .unwrap_or_else(|| self.root.join("calibration.txt"))
    }

    /// Enabled auxiliary label kinds.
    pub fn label_kinds(&self) -> Vec<LabelKind> {
        let enabled = [
            self.load_text_descriptions,
            self.load_text_labels,
            self.load_aruco_labels,
        ];
        LabelKind::ALL
            .iter()
            .zip(enabled.iter())
            .filter(|(_, on)| **on)
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// The dynamic point filter, if enabled.
    pub fn dynamic_filter(&self) -> Option<DynamicPointFilter> {
        if self.exclude_dynamic_classes {
            Some(DynamicPointFilter::new(self.dynamic_classes.iter().copied()))
        } else {
            None
        }
    }
}

// MINING ####################################################

/// Distance thresholds (meters) of positives and non negatives.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub positive_threshold: f64,
    pub negative_threshold: f64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            positive_threshold: 10.0,
            negative_threshold: 50.0,
        }
    }
}

// BATCHING ##################################################

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub batch_size: usize,
    /// Batch size of the val and test subsets, `batch_size` if absent.
    pub val_batch_size: Option<usize>,
    pub shuffle: bool,
    /// Seed of shuffling and of the set transform. Random if absent.
    pub seed: Option<u64>,
    pub drop_last: bool,
    /// Zero loads samples sequentially.
    pub num_workers: usize,
    pub quantization_size: Float,
    pub batch_split_size: Option<usize>,
    pub set_transform: Option<CloudSetTransform>,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        BatchingConfig {
            batch_size: 16,
            val_batch_size: None,
            shuffle: false,
            seed: None,
            drop_last: false,
            num_workers: 0,
            quantization_size: 0.5,
            batch_split_size: None,
            set_transform: None,
        }
    }
}

impl BatchingConfig {
    pub fn assembler(&self) -> Result<BatchAssembler> {
        let assembler = BatchAssembler::new(self.quantization_size)?
            .with_set_transform(self.set_transform)
            .with_batch_split_size(self.batch_split_size);
        Ok(match self.seed {
            Some(seed) => assembler.with_seed(seed),
            None => assembler,
        })
    }

    /// Sampler of batches of indices in `0..dataset_len`.
    pub fn sampler(&self, dataset_len: usize) -> Result<BatchSampler> {
        let sampler = BatchSampler::new(dataset_len, self.batch_size)?
            .shuffle(self.shuffle)
            .drop_last(self.drop_last);
        Ok(match self.seed {
            Some(seed) => sampler.with_seed(seed),
            None => sampler,
        })
    }

    /// Batching of the validation subset: `val_batch_size` samples per batch,
    /// and whole batches.
    pub fn val(&self) -> BatchingConfig {
        BatchingConfig {
            batch_size: self.val_batch_size.unwrap_or(self.batch_size),
            batch_split_size: None,
            ..self.clone()
        }
    }

    /// Batching of the test subset: validation batches, in order, keeping the last one.
    pub fn test(&self) -> BatchingConfig {
        BatchingConfig {
            shuffle: false,
            drop_last: false,
            ..self.val()
        }
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config: Config = "[dataset]\nroot = \"/data/itlp\"\n".parse().unwrap();
        assert_eq!(Subset::Train, config.dataset.subset);
        assert_eq!(PathBuf::from("/data/itlp/train.csv"), config.dataset.manifest_path());
        assert_eq!(
            PathBuf::from("/data/itlp/calibration.txt"),
            config.dataset.calibration_path()
        );
        assert_eq!(
            vec![Sensor::Camera(crate::core::camera::CameraId::FrontCam), Sensor::Lidar],
            config.dataset.sensors().unwrap()
        );
        assert_eq!([320, 192], config.dataset.image_size);
        assert_eq!(MiningConfig::default(), config.mining);
        assert_eq!(16, config.batching.batch_size);
        assert!(config.dataset.label_kinds().is_empty());
        assert!(config.dataset.dynamic_filter().is_none());
    }

    #[test]
    fn full_file() {
        let content = r#"
[dataset]
root = "/data/itlp"
subset = "track"
sensors = ["back_cam", "lidar", "lidar"]
load_semantics = true
load_aruco_labels = true
exclude_dynamic_classes = true
dynamic_classes = [11, 13]
max_point_distance = 60.0

[mining]
positive_threshold = 5.0
negative_threshold = 20.0

[batching]
batch_size = 4
shuffle = true
seed = 3
num_workers = 2
set_transform = { max_yaw = 3.14 }
"#;
        let config: Config = content.parse().unwrap();
        assert_eq!(PathBuf::from("/data/itlp/track.csv"), config.dataset.manifest_path());
        assert_eq!(2, config.dataset.sensors().unwrap().len());
        assert_eq!(vec![LabelKind::ArucoLabels], config.dataset.label_kinds());
        let filter = config.dataset.dynamic_filter().unwrap();
        assert!(filter.is_dynamic(13) && !filter.is_dynamic(12));
        assert_eq!(Some(60.0), config.dataset.max_point_distance);
        assert_eq!(5.0, config.mining.positive_threshold);
        let transform = config.batching.set_transform.unwrap();
        assert_eq!(0.0, transform.max_tilt);
        assert!(config.batching.assembler().is_ok());
        assert_eq!(3, config.batching.sampler(10).unwrap().len());
        assert_eq!(4, config.batching.val().batch_size);
    }

    #[test]
    fn val_and_test_batching() {
        let batching = BatchingConfig {
            batch_size: 8,
            val_batch_size: Some(32),
            shuffle: true,
            drop_last: true,
            batch_split_size: Some(2),
            ..BatchingConfig::default()
        };
        let val = batching.val();
        assert_eq!(32, val.batch_size);
        assert!(val.shuffle && val.drop_last);
        assert_eq!(None, val.batch_split_size);
        let test = batching.test();
        assert_eq!(32, test.batch_size);
        assert!(!test.shuffle && !test.drop_last);
        assert!(BatchingConfig {
            batch_size: 0,
            ..batching
        }
        .sampler(10)
        .unwrap_err()
        .is_configuration());
    }

    #[test]
    fn invalid_values() {
        let with = |extra: &str| format!("[dataset]\nroot = \"/d\"\n{}", extra).parse::<Config>();
        assert!(with("[mining]\npositive_threshold = -1.0\n")
            .unwrap_err()
            .is_configuration());
        assert!(with("[batching]\nquantization_size = 0.0\n").is_err());
        assert!(with("[batching]\nbatch_size = 0\n").is_err());
        assert!(with("[batching]\nval_batch_size = 0\n").is_err());
        assert!(with("[batching]\nquantization_size = 1e-9\n").is_err());
        assert!(match "[dataset]\nroot = \"/d\"\nsensors = [\"radar\"]\n".parse::<Config>() {
            Err(Error::UnknownModality(name)) => name == "radar",
            _ => false,
        });
        assert!("[dataset]\nroot = \"/d\"\nexclude_dynamic_classes = true\n"
            .parse::<Config>()
            .is_err());
        assert!(match "[dataset]\nroot = 3\n".parse::<Config>() {
            Err(Error::Config(_)) => true,
            _ => false,
        });
        assert!("[mining]\n".parse::<Config>().is_err());
    }
}
