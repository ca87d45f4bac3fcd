// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Core functionalities of place recognition data preparation.

pub mod batch;
pub mod camera;
pub mod dynamic_filter;
pub mod labels;
pub mod point_cloud;
pub mod quantization;
pub mod spatial_index;
pub mod transform;
