// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Auxiliary per-frame labels (text and ArUco detections).

use std::sync::Arc;

use crate::core::camera::CameraId;

/// Kind of auxiliary label table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LabelKind {
    TextDescriptions,
    TextLabels,
    ArucoLabels,
}

impl LabelKind {
    pub const ALL: [LabelKind; 3] = [
        LabelKind::TextDescriptions,
        LabelKind::TextLabels,
        LabelKind::ArucoLabels,
    ];

    /// Key prefix in samples, followed by the camera name.
    pub fn prefix(self) -> &'static str {
        match self {
            LabelKind::TextDescriptions => "text_description_",
            LabelKind::TextLabels => "text_labels_",
            LabelKind::ArucoLabels => "aruco_labels_",
        }
    }
}

/// Rows of a label table matching one camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLabels {
    pub headers: Arc<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl FrameLabels {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of a named column in a row.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// Key of a label list in a sample.
pub fn sample_key(kind: LabelKind, camera: CameraId) -> String {
    format!("{}{}", kind.prefix(), camera)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_column_access() {
        let labels = FrameLabels {
            headers: Arc::new(vec!["path".to_string(), "text".to_string()]),
            rows: vec![vec!["1.png".to_string(), "EXIT".to_string()]],
        };
        assert_eq!(Some("EXIT"), labels.get(0, "text"));
        assert_eq!(None, labels.get(0, "score"));
        assert_eq!(None, labels.get(1, "text"));
        assert_eq!(
            "aruco_labels_back_cam",
            sample_key(LabelKind::ArucoLabels, CameraId::BackCam)
        );
    }
}
