// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image, matrix and array types.

use image::RgbImage;
use ndarray::{Array2, Array3};

use crate::misc::type_aliases::{Float, Label, LabelMap};

/// Convert an `RgbImage` into a channel first `[3, height, width]` array
/// with values in `[0, 1]`.
pub fn array_from_rgb(img: &RgbImage) -> Array3<Float> {
    let (width, height) = img.dimensions();
    Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
        Float::from(img.get_pixel(x as u32, y as u32)[c]) / 255.0
    })
}

/// Convert a column major label map into a row major `[height, width]` array.
pub fn array_from_labels(labels: &LabelMap) -> Array2<Label> {
    Array2::from_shape_fn(labels.shape(), |(r, c)| labels[(r, c)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn rgb_is_channel_first() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));
        let a = array_from_rgb(&img);
        assert_eq!(&[3, 1, 2], a.shape());
        assert_eq!(1.0, a[[0, 0, 1]]);
        assert_eq!(0.0, a[[1, 0, 1]]);
        assert!((a[[2, 0, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(0.0, a[[0, 0, 0]]);
    }

    #[test]
    fn labels_are_row_major() {
        let labels = LabelMap::from_row_slice(2, 3, &[1, 2, 3, 4, 5, 6]);
        let a = array_from_labels(&labels);
        assert_eq!(&[2, 3], a.shape());
        assert_eq!(Some(&[1, 2, 3, 4, 5, 6][..]), a.as_slice());
    }
}
