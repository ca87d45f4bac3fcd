// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Place recognition data pipeline in Rust (oprs).
//!
//! Positive and negative pairs are mined from trajectory poses
//! by a [`SpatialIndex`](crate::core::spatial_index::SpatialIndex) built once per dataset.
//! Samples (camera images, semantic masks, lidar clouds, auxiliary labels)
//! are loaded by a [`PlaceRecognitionDataset`](crate::dataset::track::PlaceRecognitionDataset),
//! with lidar points on dynamic objects removed by a
//! [`DynamicPointFilter`](crate::core::dynamic_filter::DynamicPointFilter),
//! and collated by a [`BatchAssembler`](crate::core::batch::BatchAssembler)
//! into stacked arrays, sparse quantized clouds,
//! and the positives and negatives masks of the batch.

pub mod config;
pub mod core;
pub mod dataset;
pub mod error;
pub mod math;
pub mod misc;
