// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types shared by the whole data pipeline.
//!
//! Nothing in this crate retries on error.
//! Failures abort the current sample, batch or dataset construction
//! and the caller decides what to do at a higher level.

use std::path::PathBuf;
use thiserror::Error;

/// Errors of the place recognition data pipeline.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration ----------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown modality: {0:?}")]
    UnknownModality(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Calibration parsing error: {0}")]
    CalibrationParse(String),

    #[error("No calibration for camera {0}")]
    MissingCalibration(String),

    // Resource not found -----------------------------------------------------
    #[error("Given dataset root {0:?} doesn't exist")]
    DatasetNotFound(PathBuf),

    #[error("There is no manifest file {0:?}")]
    MissingManifest(PathBuf),

    #[error("Cannot read sample file {path:?}: {source}")]
    SampleRead {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // Unsupported ------------------------------------------------------------
    #[error("Not supported: {0}")]
    NotSupported(String),

    // Wrapped ----------------------------------------------------------------
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Wrap any error raised while reading the file of a sample.
    pub fn sample_read<P, E>(path: P, source: E) -> Error
    where
        P: Into<PathBuf>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::SampleRead {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Bad thresholds, unknown modality, missing column, bad config file.
    pub fn is_configuration(&self) -> bool {
        match self {
            Error::InvalidArgument(_)
            | Error::UnknownModality(_)
            | Error::Schema(_)
            | Error::Config(_)
            | Error::CalibrationParse(_)
            | Error::MissingCalibration(_) => true,
            _ => false,
        }
    }

    /// Missing root directory, manifest or per-sample file.
    pub fn is_resource_not_found(&self) -> bool {
        match self {
            Error::DatasetNotFound(_) | Error::MissingManifest(_) | Error::SampleRead { .. } => {
                true
            }
            _ => false,
        }
    }

    /// Explicitly unimplemented feature.
    pub fn is_unsupported(&self) -> bool {
        match self {
            Error::NotSupported(_) => true,
            _ => false,
        }
    }
}

/// Result type of the crate.
pub type Result<T> = std::result::Result<T, Error>;
