use std::fmt::Debug;

use log::trace;
use nalgebra::Vector3;
use ndarray::Array3;
use rayon::prelude::*;

use crate::error::{ResliceError, Result};

/// Voxel sample type of a [`Volume`].
pub trait Scalar: bytemuck::Pod + Default + PartialOrd + Debug + Send + Sync {
    /// MetaImage `ElementType` name.
    const MET_TYPE: &'static str;

    fn to_f64(self) -> f64;

    /// Convert an interpolated value back, rounding and clamping integer types.
    fn from_f64(value: f64) -> Self;
}

macro_rules! integer_scalar {
    ($t:ty, $met:literal) => {
        impl Scalar for $t {
            const MET_TYPE: &'static str = $met;

            #[inline]
            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                // `as` saturates and maps NaN to zero
                value.round() as $t
            }
        }
    };
}

integer_scalar!(u8, "MET_UCHAR");
integer_scalar!(i16, "MET_SHORT");
integer_scalar!(u16, "MET_USHORT");

impl Scalar for f32 {
    const MET_TYPE: &'static str = "MET_FLOAT";

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

/// A 3D scalar grid with physical geometry.
///
/// Data is indexed `[z, y, x]`; `origin`, `spacing` and `extent` are in
/// `(x, y, z)` order. The extent holds the inclusive structured index range
/// per axis, so voxel `(i, j, k)` sits at `origin + (i, j, k) * spacing`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    data: Array3<T>,
    origin: [f64; 3],
    spacing: [f64; 3],
    extent: [i32; 6],
}

/// Output of the resampler. Same layout as the input volume.
pub type ScalarGrid<T> = Volume<T>;

impl<T: Scalar> Volume<T> {
    /// Volume whose structured extent starts at zero on every axis.
    pub fn new(data: Array3<T>, origin: [f64; 3], spacing: [f64; 3]) -> Result<Self> {
        let (depth, height, width) = data.dim();
        let extent = [
            0,
            width as i32 - 1,
            0,
            height as i32 - 1,
            0,
            depth as i32 - 1,
        ];
        Self::with_extent(data, origin, spacing, extent)
    }

    pub fn with_extent(
        data: Array3<T>,
        origin: [f64; 3],
        spacing: [f64; 3],
        extent: [i32; 6],
    ) -> Result<Self> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ResliceError::InvalidVolumeGeometry(format!(
                "spacing must be positive, got {spacing:?}"
            )));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(ResliceError::InvalidVolumeGeometry(format!(
                "origin must be finite, got {origin:?}"
            )));
        }
        if extent.chunks(2).any(|axis| axis[1] < axis[0]) {
            return Err(ResliceError::InvalidVolumeGeometry(format!(
                "extent is empty: {extent:?}"
            )));
        }
        let (depth, height, width) = data.dim();
        let expected = (
            (extent[5] - extent[4] + 1) as usize,
            (extent[3] - extent[2] + 1) as usize,
            (extent[1] - extent[0] + 1) as usize,
        );
        if (depth, height, width) != expected {
            return Err(ResliceError::InvalidVolumeGeometry(format!(
                "data shape {:?} does not match extent {extent:?}",
                (depth, height, width)
            )));
        }
        Ok(Self {
            data,
            origin,
            spacing,
            extent,
        })
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of voxels along (x, y, z).
    pub fn dims_xyz(&self) -> [usize; 3] {
        let (depth, height, width) = self.data.dim();
        [width, height, depth]
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn extent(&self) -> [i32; 6] {
        self.extent
    }

    /// Physical centre: `origin + spacing * voxel_count / 2` per axis.
    pub fn center(&self) -> Vector3<f64> {
        let dims = self.dims_xyz();
        Vector3::from_fn(|i, _| self.origin[i] + self.spacing[i] * dims[i] as f64 * 0.5)
    }

    /// Physical position of the middle of the structured extent.
    pub fn extent_center(&self) -> Vector3<f64> {
        Vector3::from_fn(|i, _| {
            let mid = f64::from(self.extent[2 * i] + self.extent[2 * i + 1]) * 0.5;
            self.origin[i] + self.spacing[i] * mid
        })
    }

    /// Continuous array index `(x, y, z)` of a physical point, relative to the
    /// first voxel of the extent.
    #[inline]
    pub(crate) fn continuous_index(&self, point: &Vector3<f64>) -> [f64; 3] {
        [0, 1, 2].map(|i| {
            (point[i] - self.origin[i]) / self.spacing[i] - f64::from(self.extent[2 * i])
        })
    }

    /// Minimum and maximum sample value.
    pub fn scalar_range(&self) -> (f64, f64) {
        let range = self
            .data
            .as_slice_memory_order()
            .map(|values| {
                values
                    .par_iter()
                    .map(|v| (v.to_f64(), v.to_f64()))
                    .reduce(
                        || (f64::INFINITY, f64::NEG_INFINITY),
                        |a, b| (a.0.min(b.0), a.1.max(b.1)),
                    )
            })
            .unwrap_or_else(|| {
                self.data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |a, v| {
                    (a.0.min(v.to_f64()), a.1.max(v.to_f64()))
                })
            });
        trace!("scalar range {range:?}");
        range
    }
}

/// A volume of any supported scalar type.
#[derive(Debug, Clone, PartialEq)]
pub enum DynVolume {
    U8(Volume<u8>),
    I16(Volume<i16>),
    U16(Volume<u16>),
    F32(Volume<f32>),
}

impl DynVolume {
    pub fn element_type(&self) -> &'static str {
        match self {
            DynVolume::U8(_) => u8::MET_TYPE,
            DynVolume::I16(_) => i16::MET_TYPE,
            DynVolume::U16(_) => u16::MET_TYPE,
            DynVolume::F32(_) => f32::MET_TYPE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn center_uses_voxel_count() {
        let data = Array3::<u16>::zeros((10, 20, 40));
        let volume = Volume::new(data, [-5.0, 0.0, 2.0], [0.5, 1.0, 2.0]).unwrap();
        assert_eq!(volume.extent(), [0, 39, 0, 19, 0, 9]);
        assert_eq!(volume.dims_xyz(), [40, 20, 10]);
        assert_relative_eq!(volume.center(), Vector3::new(5.0, 10.0, 12.0));
        assert_relative_eq!(volume.extent_center(), Vector3::new(4.75, 9.5, 11.0));
    }

    #[test]
    fn continuous_index_accounts_for_extent_start() {
        let data = Array3::<u8>::zeros((2, 3, 4));
        let volume =
            Volume::with_extent(data, [0.0, 0.0, 0.0], [2.0, 2.0, 2.0], [10, 13, 0, 2, -1, 0])
                .unwrap();
        let idx = volume.continuous_index(&Vector3::new(22.0, 3.0, -2.0));
        assert_eq!(idx, [1.0, 1.5, 0.0]);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let data = Array3::<u8>::zeros((2, 2, 2));
        assert!(matches!(
            Volume::new(data.clone(), [0.0; 3], [1.0, 0.0, 1.0]),
            Err(ResliceError::InvalidVolumeGeometry(_))
        ));
        assert!(matches!(
            Volume::new(data.clone(), [0.0; 3], [1.0, -1.0, 1.0]),
            Err(ResliceError::InvalidVolumeGeometry(_))
        ));
        assert!(matches!(
            Volume::with_extent(data, [0.0; 3], [1.0; 3], [0, 2, 0, 1, 0, 1]),
            Err(ResliceError::InvalidVolumeGeometry(_))
        ));
        assert!(matches!(
            Volume::new(Array3::<u8>::zeros((0, 2, 2)), [0.0; 3], [1.0; 3]),
            Err(ResliceError::InvalidVolumeGeometry(_))
        ));
    }

    #[test]
    fn scalar_range_spans_data() {
        let data = Array3::from_shape_fn((2, 3, 4), |(z, y, x)| (z * 100 + y * 10 + x) as i16 - 50);
        let volume = Volume::new(data, [0.0; 3], [1.0; 3]).unwrap();
        assert_eq!(volume.scalar_range(), (-50.0, 123.0 - 50.0));
    }

    #[test]
    fn integer_conversion_rounds_and_saturates() {
        assert_eq!(u8::from_f64(254.6), 255);
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-3.0), 0);
        assert_eq!(i16::from_f64(-2.5), -3);
        assert_eq!(u16::from_f64(f64::NAN), 0);
        assert_eq!(f32::from_f64(1.5), 1.5);
    }
}
