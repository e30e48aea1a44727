//! Oblique resampling of a volume along a set of reslice axes.
//!
//! The reslice axes map output coordinates to input (world) coordinates. An
//! [`OutputGrid`] places the output samples in output coordinates; every
//! sample is transformed by the axes, converted to a continuous voxel index of
//! the input volume and interpolated. Samples falling outside the input get
//! the background value 0.

use log::debug;
use nalgebra::{Matrix4, Point3, Vector3};
use ndarray::Array3;
use rayon::prelude::*;

use crate::depth::GeometryRecord;
use crate::enums::{Dimensionality, Interpolation};
use crate::error::{ResliceError, Result};
use crate::interpolator::Interpolator;
use crate::reslice_axes::is_finite;
use crate::volume::{Scalar, ScalarGrid, Volume};

const BACKGROUND: f64 = 0.0;

/// Sampling lattice of a resampler output, in output coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputGrid {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    /// Sample count along (x, y, z).
    pub dims: [usize; 3],
}

impl OutputGrid {
    /// Grid covering the whole input volume as seen through `axes`.
    ///
    /// Spacing and length along each output axis are the input spacing and
    /// length weighted by the squared direction cosines of that axis. The grid
    /// is centred on the input volume centre; a 2D grid is the single plane
    /// through that centre.
    pub fn covering<T: Scalar>(
        volume: &Volume<T>,
        axes: &Matrix4<f64>,
        dimensionality: Dimensionality,
    ) -> Result<Self> {
        if !is_finite(axes) {
            return Err(ResliceError::InvalidAxes);
        }
        let inverse = axes
            .try_inverse()
            .ok_or(ResliceError::NonInvertibleTransform)?;
        let in_spacing = volume.spacing();
        let in_dims = volume.dims_xyz();
        let center = inverse.transform_point(&Point3::from(volume.extent_center()));

        let mut grid = OutputGrid {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            dims: [1; 3],
        };
        for i in 0..3 {
            let (mut r, mut s, mut d) = (0.0, 0.0, 0.0);
            for j in 0..3 {
                let w = axes[(j, i)] * axes[(j, i)];
                r += w;
                s += w * in_spacing[j];
                d += w * (in_dims[j] - 1) as f64 * in_spacing[j];
            }
            if r == 0.0 {
                return Err(ResliceError::NonInvertibleTransform);
            }
            let spacing = s / r;
            let length = d / (r * r.sqrt());
            grid.spacing[i] = spacing;
            grid.dims[i] = (length / spacing).round() as usize + 1;
            grid.origin[i] = center[i] - 0.5 * (grid.dims[i] - 1) as f64 * spacing;
        }
        if dimensionality == Dimensionality::TwoD {
            grid.dims[2] = 1;
            grid.origin[2] = center[2];
        }
        Ok(grid)
    }

    /// The probe image plane: one sample per ROI pixel at the depth spacing,
    /// on the probe's local `z = 0` plane and centred on `footprint_center`.
    ///
    /// Reslice axes are expressed relative to `volume_center`, so a local probe
    /// position `q` is the output coordinate `volume_center + q`.
    pub fn footprint(
        volume_center: &Vector3<f64>,
        geometry: &GeometryRecord,
        footprint_center: &Vector3<f64>,
    ) -> Self {
        let dims = [
            geometry.roi.width() as usize,
            geometry.roi.height() as usize,
            1,
        ];
        let spacing = geometry.spacing;
        let origin = [
            volume_center.x + footprint_center.x - 0.5 * (dims[0] - 1) as f64 * spacing[0],
            volume_center.y + footprint_center.y - 0.5 * (dims[1] - 1) as f64 * spacing[1],
            volume_center.z,
        ];
        OutputGrid {
            origin,
            spacing,
            dims,
        }
    }

    /// Physical extent covered by the samples (dims * spacing).
    pub fn field_of_view(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.dims[i] as f64 * self.spacing[i])
    }

    #[inline]
    fn point(&self, x: usize, y: usize, z: usize) -> Point3<f64> {
        Point3::new(
            self.origin[0] + x as f64 * self.spacing[0],
            self.origin[1] + y as f64 * self.spacing[1],
            self.origin[2] + z as f64 * self.spacing[2],
        )
    }

    fn validate(&self) -> Result<()> {
        if self.dims.contains(&0) {
            return Err(ResliceError::InvalidVolumeGeometry(format!(
                "output grid is empty: {:?}",
                self.dims
            )));
        }
        if self.spacing.iter().any(|s| !s.is_finite() || *s <= 0.0)
            || self.origin.iter().any(|o| !o.is_finite())
        {
            return Err(ResliceError::InvalidVolumeGeometry(format!(
                "output grid geometry is not usable: origin {:?}, spacing {:?}",
                self.origin, self.spacing
            )));
        }
        Ok(())
    }
}

/// Resample `volume` along `axes` on `grid`.
///
/// The output keeps the input scalar type. Nothing is produced when the axes
/// contain non-finite values.
pub fn resample<T: Scalar>(
    volume: &Volume<T>,
    axes: &Matrix4<f64>,
    grid: &OutputGrid,
    interpolation: Interpolation,
) -> Result<ScalarGrid<T>> {
    if !is_finite(axes) {
        return Err(ResliceError::InvalidAxes);
    }
    grid.validate()?;
    debug!("resampling {:?} with {interpolation:?}", grid.dims);

    let view = volume.data().view();
    let [width, height, depth] = grid.dims;
    let background = T::from_f64(BACKGROUND);

    let values: Vec<T> = (0..depth * height)
        .into_par_iter()
        .flat_map(|row| {
            let (z, y) = (row / height, row % height);
            (0..width)
                .map(|x| {
                    let world = axes.transform_point(&grid.point(x, y, z));
                    let index = volume.continuous_index(&world.coords);
                    Interpolator::sample(&view, index, interpolation)
                        .map_or(background, T::from_f64)
                })
                .collect::<Vec<T>>()
        })
        .collect();

    let data = Array3::from_shape_vec((depth, height, width), values)
        .map_err(|e| ResliceError::InvalidVolumeGeometry(e.to_string()))?;
    Volume::new(data, grid.origin, grid.spacing)
}
