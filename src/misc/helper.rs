// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::misc::type_aliases::{Label, LabelMap};

/// Decode a single channel 8 or 16 bits png into a matrix of label ids.
///
/// Values are kept as is: an 8 bits label 7 stays 7,
/// which is not the case with the usual 8 to 16 bits conversions.
pub fn read_label_png<R: Read>(r: R) -> Result<LabelMap, String> {
    let mut decoder = png::Decoder::new(r);
    // Use the IDENTITY transformation because by default
    // it will use STRIP_16 which only keep 8 bits.
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info().map_err(|e| e.to_string())?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer).map_err(|e| e.to_string())?;
    buffer.truncate(info.buffer_size());

    if info.color_type != png::ColorType::Grayscale {
        return Err(format!(
            "Label masks must be single channel, got {:?}",
            info.color_type
        ));
    }
    let (width, height) = (info.width as usize, info.height as usize);
    let labels: Vec<Label> = match info.bit_depth {
        png::BitDepth::Eight => buffer.iter().map(|&v| Label::from(v)).collect(),
        png::BitDepth::Sixteen => {
            // Png stores 16 bits samples in big endian.
            let mut buffer_u16 = vec![0; width * height];
            let mut buffer_cursor = Cursor::new(buffer);
            buffer_cursor
                .read_u16_into::<BigEndian>(&mut buffer_u16)
                .map_err(|e| e.to_string())?;
            buffer_u16
        }
        depth => return Err(format!("Unsupported label bit depth {:?}", depth)),
    };
    Ok(LabelMap::from_row_slice(height, width, &labels))
}

/// Nearest neighbour resize of a label map.
/// Source pixel of destination `(r, c)` is `(floor(r * sy), floor(c * sx))`,
/// so label ids are never mixed.
pub fn resize_nearest(labels: &LabelMap, width: usize, height: usize) -> LabelMap {
    let (src_h, src_w) = labels.shape();
    if (src_h, src_w) == (height, width) {
        return labels.clone();
    }
    let sy = src_h as f64 / height as f64;
    let sx = src_w as f64 / width as f64;
    LabelMap::from_fn(height, width, |r, c| {
        let sr = ((r as f64 * sy).floor() as usize).min(src_h - 1);
        let sc = ((c as f64 * sx).floor() as usize).min(src_w - 1);
        labels[(sr, sc)]
    })
}

// TESTS #############################################################
