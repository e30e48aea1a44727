//! Linear scalar to RGB mapping for resliced planes.

use image::{ImageBuffer, Rgb, RgbImage};
use ndarray::ArrayView2;
use ndarray::s;
use rayon::prelude::*;

use crate::error::{ResliceError, Result};
use crate::volume::{Scalar, ScalarGrid};

/// Linear grey ramp between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearLookup {
    pub min: f64,
    pub max: f64,
}

impl LinearLookup {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn map(&self, value: f64) -> Rgb<u8> {
        let width = self.max - self.min;
        let t = if width > 0.0 {
            ((value - self.min) / width).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let grey = (t * 255.0).round() as u8;
        Rgb([grey, grey, grey])
    }
}

/// Colour-map the first plane of `grid` using the plane's own value range.
///
/// Image row `r` holds grid row `y = r`.
pub fn map_to_rgb<T: Scalar>(grid: &ScalarGrid<T>) -> Result<RgbImage> {
    let plane: ArrayView2<T> = grid.data().slice(s![0, .., ..]);
    let (height, width) = plane.dim();
    let (min, max) = grid.scalar_range();
    let lookup = LinearLookup::new(min, max);

    let pixels: Vec<u8> = (0..height)
        .into_par_iter()
        .flat_map(|y| {
            (0..width)
                .flat_map(|x| lookup.map(plane[[y, x]].to_f64()).0)
                .collect::<Vec<u8>>()
        })
        .collect();

    ImageBuffer::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        ResliceError::InvalidVolumeGeometry(format!(
            "cannot build a {width}x{height} RGB image"
        ))
    })
}
