// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Samples, batches, and the assembly of samples into batches.
//!
//! Each modality has its own batching strategy:
//! images and masks are stacked along a new leading dimension,
//! point clouds are transformed together then quantized one by one
//! and concatenated with batch index prefixed coordinates,
//! and auxiliary labels are simply listed.

use itertools::Itertools;
use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array, Array2, Array3, Array4, ArrayView, Axis, Dimension, RemoveAxis};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::core::camera::CameraId;
use crate::core::labels::{self, FrameLabels, LabelKind};
use crate::core::point_cloud::PointCloud;
use crate::core::quantization::{self, SparseBatch, MIN_QUANTIZATION_SIZE};
use crate::core::spatial_index::SpatialIndex;
use crate::core::transform::CloudSetTransform;
use crate::error::{Error, Result};
use crate::misc::interop;
use crate::misc::type_aliases::{Float, Label, LabelMap, Point3};

/// Sample key of the point cloud coordinates.
pub const POINTCLOUD_COORDS_KEY: &str = "pointcloud_lidar_coords";
/// Sample key of the point cloud features, carried by the same cloud.
pub const POINTCLOUD_FEATS_KEY: &str = "pointcloud_lidar_feats";

/// Pose of a sample: `tx, ty, tz, qx, qy, qz, qw`.
pub type Pose = [Float; 7];

// MODALITY ##################################################

/// Closed set of the data a sample may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modality {
    Image(CameraId),
    Mask(CameraId),
    PointCloud,
    Labels(LabelKind, CameraId),
}

impl Modality {
    /// Key of the modality in a batch.
    pub fn batch_key(&self) -> String {
        match self {
            Modality::Image(cam) => format!("images_{}", cam),
            Modality::Mask(cam) => format!("masks_{}", cam),
            Modality::PointCloud => "pointclouds_lidar".to_string(),
            Modality::Labels(kind, cam) => labels::sample_key(*kind, *cam),
        }
    }
}

/// Key of the modality in a sample.
impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Modality::Image(cam) => write!(f, "image_{}", cam),
            Modality::Mask(cam) => write!(f, "mask_{}", cam),
            Modality::PointCloud => f.write_str(POINTCLOUD_COORDS_KEY),
            Modality::Labels(kind, cam) => f.write_str(&labels::sample_key(*kind, *cam)),
        }
    }
}

impl FromStr for Modality {
    type Err = Error;
    fn from_str(key: &str) -> Result<Modality> {
        let unknown = || Error::UnknownModality(key.to_string());
        if key == POINTCLOUD_COORDS_KEY || key == POINTCLOUD_FEATS_KEY {
            return Ok(Modality::PointCloud);
        }
        if let Some(cam) = key.strip_prefix("image_") {
            return cam.parse().map(Modality::Image).map_err(|_| unknown());
        }
        if let Some(cam) = key.strip_prefix("mask_") {
            return cam.parse().map(Modality::Mask).map_err(|_| unknown());
        }
        for kind in LabelKind::ALL.iter() {
            if let Some(cam) = key.strip_prefix(kind.prefix()) {
                return cam
                    .parse()
                    .map(|cam| Modality::Labels(*kind, cam))
                    .map_err(|_| unknown());
            }
        }
        Err(unknown())
    }
}

// SAMPLE ####################################################

/// Data of one modality of a sample.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    Image(Array3<Float>),
    Mask(LabelMap),
    PointCloud(PointCloud),
    Labels(FrameLabels),
}

/// One loaded and transformed dataset element.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub index: usize,
    pub pose: Pose,
    pub images: BTreeMap<CameraId, Array3<Float>>,
    pub masks: BTreeMap<CameraId, LabelMap>,
    pub cloud: Option<PointCloud>,
    pub labels: BTreeMap<(LabelKind, CameraId), FrameLabels>,
}

impl Sample {
    pub fn new(index: usize, pose: Pose) -> Sample {
        Sample {
            index,
            pose,
            images: BTreeMap::new(),
            masks: BTreeMap::new(),
            cloud: None,
            labels: BTreeMap::new(),
        }
    }

    /// Insert data under its textual sample key, such as `"image_front_cam"`.
    pub fn insert(&mut self, key: &str, data: SampleData) -> Result<()> {
        match (key.parse::<Modality>()?, data) {
            (Modality::Image(cam), SampleData::Image(t)) => {
                self.images.insert(cam, t);
            }
            (Modality::Mask(cam), SampleData::Mask(m)) => {
                self.masks.insert(cam, m);
            }
            (Modality::PointCloud, SampleData::PointCloud(c)) => self.cloud = Some(c),
            (Modality::Labels(kind, cam), SampleData::Labels(l)) => {
                self.labels.insert((kind, cam), l);
            }
            (modality, _) => {
                return Err(Error::Schema(format!(
                    "Wrong kind of data for modality {}",
                    modality
                )))
            }
        }
        Ok(())
    }

    /// All modalities present in the sample.
    pub fn modalities(&self) -> BTreeSet<Modality> {
        let images = self.images.keys().map(|&c| Modality::Image(c));
        let masks = self.masks.keys().map(|&c| Modality::Mask(c));
        let cloud = self.cloud.iter().map(|_| Modality::PointCloud);
        let labels = self.labels.keys().map(|&(k, c)| Modality::Labels(k, c));
        images.chain(masks).chain(cloud).chain(labels).collect()
    }
}

// BATCH #####################################################

/// Samples collated for the training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Dataset indices of the samples, `idxs`.
    pub indices: Vec<usize>,
    /// `[K, 7]` poses.
    pub poses: Array2<Float>,
    /// `[K, 3, H, W]` per camera.
    pub images: BTreeMap<CameraId, Array4<Float>>,
    /// `[K, H, W]` per camera.
    pub masks: BTreeMap<CameraId, Array3<Label>>,
    pub clouds: Option<SparseBatch>,
    pub labels: BTreeMap<(LabelKind, CameraId), Vec<FrameLabels>>,
    /// `positives_mask[(a, b)]`: sample `b` is a positive of sample `a`.
    pub positives_mask: DMatrix<bool>,
    /// `negatives_mask[(a, b)]`: sample `b` is a valid negative of sample `a`.
    pub negatives_mask: DMatrix<bool>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Keys of all batched data, as seen by the training loop.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = vec!["idxs".to_string(), "poses".to_string()];
        keys.extend(self.images.keys().map(|&c| Modality::Image(c).batch_key()));
        keys.extend(self.masks.keys().map(|&c| Modality::Mask(c).batch_key()));
        if self.clouds.is_some() {
            let key = Modality::PointCloud.batch_key();
            keys.push(format!("{}_coords", key));
            keys.push(format!("{}_feats", key));
        }
        keys.extend(
            self.labels
                .keys()
                .map(|&(k, c)| Modality::Labels(k, c).batch_key()),
        );
        keys
    }
}

// ASSEMBLER #################################################

/// Collate samples into batches.
#[derive(Debug)]
pub struct BatchAssembler {
    quantization_size: Float,
    set_transform: Option<CloudSetTransform>,
    batch_split_size: Option<usize>,
    rng: StdRng,
}

impl BatchAssembler {
    /// Voxel coordinates must fit in `i32`,
    /// so `quantization_size` is at least `MIN_QUANTIZATION_SIZE`.
    pub fn new(quantization_size: Float) -> Result<BatchAssembler> {
        if !(quantization_size >= MIN_QUANTIZATION_SIZE) {
            return Err(Error::InvalidArgument(format!(
                "quantization_size must be at least {:e}, but {} given",
                MIN_QUANTIZATION_SIZE, quantization_size
            )));
        }
        Ok(BatchAssembler {
            quantization_size,
            set_transform: None,
            batch_split_size: None,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_set_transform(mut self, transform: Option<CloudSetTransform>) -> Self {
        self.set_transform = transform;
        self
    }

    /// Seed the random generator of the set transform.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Splitting batches into sub-batches for multistage training.
    /// `None` or `Some(0)` keep whole batches, the only supported mode.
    pub fn with_batch_split_size(mut self, batch_split_size: Option<usize>) -> Self {
        self.batch_split_size = batch_split_size;
        self
    }

    /// Collate samples and compute the positives and negatives masks
    /// of their dataset indices.
    pub fn assemble(&mut self, samples: Vec<Sample>, index: &SpatialIndex) -> Result<Batch> {
        if let Some(split) = self.batch_split_size.filter(|&s| s > 0) {
            return Err(Error::NotSupported(format!(
                "Multistage batch training (batch_split_size = {})",
                split
            )));
        }
        let first = samples
            .first()
            .ok_or_else(|| Error::InvalidArgument("Cannot assemble an empty batch".to_string()))?;
        let modalities = first.modalities();
        for sample in &samples {
            if sample.index >= index.len() {
                return Err(Error::InvalidArgument(format!(
                    "Sample index {} out of the spatial index of {} elements",
                    sample.index,
                    index.len()
                )));
            }
            if sample.modalities() != modalities {
                return Err(Error::Schema(format!(
                    "Sample {} modalities {:?} differ from {:?}",
                    sample.index,
                    sample.modalities(),
                    modalities
                )));
            }
        }

        let indices: Vec<usize> = samples.iter().map(|s| s.index).collect();
        let poses = Array2::from_shape_fn((samples.len(), 7), |(k, j)| samples[k].pose[j]);
        let (positives_mask, negatives_mask) = index.masks(&indices);
        let mut batch = Batch {
            poses,
            indices,
            images: BTreeMap::new(),
            masks: BTreeMap::new(),
            clouds: None,
            labels: BTreeMap::new(),
            positives_mask,
            negatives_mask,
        };

        let mut samples = samples;
        for modality in modalities {
            match modality {
                Modality::Image(cam) => {
                    let images = samples
                        .iter()
                        .filter_map(|s| s.images.get(&cam))
                        .map(|a| a.view())
                        .collect_vec();
                    batch.images.insert(cam, stack(modality, &images)?);
                }
                Modality::Mask(cam) => {
                    let masks = samples
                        .iter()
                        .filter_map(|s| s.masks.get(&cam))
                        .map(interop::array_from_labels)
                        .collect_vec();
                    let views = masks.iter().map(|m| m.view()).collect_vec();
                    batch.masks.insert(cam, stack(modality, &views)?);
                }
                Modality::PointCloud => {
                    let clouds = samples.iter_mut().filter_map(|s| s.cloud.take()).collect();
                    batch.clouds = Some(self.assemble_clouds(clouds));
                }
                Modality::Labels(kind, cam) => {
                    let labels = samples
                        .iter_mut()
                        .filter_map(|s| s.labels.remove(&(kind, cam)))
                        .collect();
                    batch.labels.insert((kind, cam), labels);
                }
            }
        }
        Ok(batch)
    }

    /// Apply the set transform on all clouds at once,
    /// then quantize each cloud independently.
    fn assemble_clouds(&mut self, clouds: Vec<PointCloud>) -> SparseBatch {
        let counts = clouds.iter().map(PointCloud::len).collect_vec();
        let mut all_points: Vec<Point3> = clouds
            .iter()
            .flat_map(|c| c.points.iter().copied())
            .collect();
        if let Some(transform) = &self.set_transform {
            transform.apply(&mut all_points, &mut self.rng);
        }

        let mut offset = 0;
        let quantized = clouds
            .into_iter()
            .zip(counts)
            .map(|(cloud, count)| {
                let transformed = PointCloud {
                    points: all_points[offset..offset + count].to_vec(),
                    features: cloud.features,
                };
                offset += count;
                quantization::sparse_quantize(&transformed, self.quantization_size)
            })
            .collect_vec();

        let batch = quantization::batched_coordinates(&quantized);
        debug!(
            "Quantized {} points into {:?} voxels",
            offset, batch.counts
        );
        batch
    }
}

/// Stack same shaped arrays along a new leading batch axis.
fn stack<A, D>(modality: Modality, arrays: &[ArrayView<A, D>]) -> Result<Array<A, D::Larger>>
where
    A: Clone,
    D: Dimension,
    D::Larger: RemoveAxis,
{
    ndarray::stack(Axis(0), arrays).map_err(|e| {
        let shapes = arrays.iter().map(|a| a.shape().to_vec()).collect_vec();
        Error::Schema(format!("Cannot stack {} of shapes {:?}: {}", modality, shapes, e))
    })
}

// TESTS #############################################################
