// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Auxiliary label tables, one per label kind and camera,
//! joined with camera frames on their image file name.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::camera::CameraId;
use crate::core::labels::{FrameLabels, LabelKind};
use crate::error::{Error, Result};

/// File of the table of `kind` for `camera`, relative to the dataset root.
pub fn table_path(root: &Path, kind: LabelKind, camera: CameraId) -> PathBuf {
    let (dir, suffix) = match kind {
        LabelKind::TextDescriptions => ("text_descriptions", "text"),
        LabelKind::TextLabels => ("text_labels", "text_labels"),
        LabelKind::ArucoLabels => ("aruco_labels", "aruco_labels"),
    };
    root.join(dir).join(format!("{}_{}.csv", camera, suffix))
}

fn delimiter(kind: LabelKind) -> u8 {
    match kind {
        LabelKind::ArucoLabels => b'\t',
        _ => b',',
    }
}

/// Column holding the image file name.
fn key_column(kind: LabelKind) -> &'static str {
    match kind {
        LabelKind::ArucoLabels => "image_name",
        _ => "path",
    }
}

/// Rows of a label table grouped by image file name.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    kind: LabelKind,
    headers: Arc<Vec<String>>,
    rows: HashMap<String, Vec<Vec<String>>>,
}

impl LabelTable {
    pub fn read(root: &Path, kind: LabelKind, camera: CameraId) -> Result<LabelTable> {
        let path = table_path(root, kind, camera);
        let file = std::fs::File::open(&path).map_err(|e| Error::sample_read(&path, e))?;
        LabelTable::from_reader(file, kind).map_err(|e| match e {
            Error::Csv(csv) => Error::sample_read(&path, csv),
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R, kind: LabelKind) -> Result<LabelTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter(kind))
            .has_headers(true)
            .from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let key = headers
            .iter()
            .position(|h| h == key_column(kind))
            .ok_or_else(|| {
                Error::Schema(format!(
                    "Label table has no {:?} column",
                    key_column(kind)
                ))
            })?;

        let mut rows: HashMap<String, Vec<Vec<String>>> = HashMap::new();
        for record in csv_reader.records() {
            let row: Vec<String> = record?.iter().map(str::to_string).collect();
            let name = row.get(key).cloned().unwrap_or_default();
            rows.entry(name).or_default().push(row);
        }
        Ok(LabelTable {
            kind,
            headers: Arc::new(headers),
            rows,
        })
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether some rows are keyed by this image file name.
    pub fn contains(&self, image_name: &str) -> bool {
        self.rows.contains_key(image_name)
    }

    /// Rows of one frame, possibly none.
    pub fn frame(&self, image_name: &str) -> FrameLabels {
        FrameLabels {
            headers: Arc::clone(&self.headers),
            rows: self.rows.get(image_name).cloned().unwrap_or_default(),
        }
    }
}

// TESTS #############################################################
