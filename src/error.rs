use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResliceError {
    #[error("Unknown ultrasound depth setting: {0}")]
    UnknownDepthSetting(f64),

    #[error("No series entry for index {0}")]
    MissingSeriesEntry(String),

    #[error("Frame name {0} is used by more than one step")]
    DuplicateFrameName(String),

    #[error("Transform is not invertible")]
    NonInvertibleTransform,

    #[error("Reslice axes contain non-finite values")]
    InvalidAxes,

    #[error("Invalid volume geometry: {0}")]
    InvalidVolumeGeometry(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Malformed transform file {}: {reason}", path.display())]
    MalformedTransformFile { path: PathBuf, reason: String },

    #[error("Malformed MetaImage file {}: {reason}", path.display())]
    MalformedMetaImage { path: PathBuf, reason: String },

    #[error("Invalid configuration {}: {source}", path.display())]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported scalar type: {0}")]
    UnsupportedScalarType(String),
}

impl ResliceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResliceError>;
