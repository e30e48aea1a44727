use serde::{Deserialize, Serialize};

/// Anatomical coordinate convention of a pose or point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Right, Anterior, Superior (host platform / scene convention)
    Ras,
    /// Left, Posterior, Superior (image file / resampler convention)
    Lps,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Linear,
    #[default]
    Cubic,
}

/// Number of sampled axes in a resampler output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensionality {
    /// One voxel thick plane
    TwoD,
    ThreeD,
}
