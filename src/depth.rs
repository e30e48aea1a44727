//! Calibration table for the ultrasound scanner depth settings.
//!
//! Each depth maps to the pixel spacing of the acquired frames and the
//! rectangular region of the raw frame that holds valid image content.

use nalgebra::{Matrix4, Vector3, Vector4};

use crate::error::{ResliceError, Result};

/// Width of the valid image region, identical for every depth.
const ROI_WIDTH: u32 = 752;

const DEPTH_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthSetting {
    D8_1,
    D9,
    D10,
    D11,
    D12,
    D14,
    D16,
    D18,
}

/// Inclusive pixel bounds of the valid image region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Roi {
    fn from_origin(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            top,
            bottom: top + height - 1,
            left,
            right: left + width - 1,
        }
    }

    pub fn width(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryRecord {
    /// Physical size of one pixel (x, y, z).
    pub spacing: [f64; 3],
    pub roi: Roi,
    pub height: u32,
}

impl DepthSetting {
    pub const ALL: [DepthSetting; 8] = [
        DepthSetting::D8_1,
        DepthSetting::D9,
        DepthSetting::D10,
        DepthSetting::D11,
        DepthSetting::D12,
        DepthSetting::D14,
        DepthSetting::D16,
        DepthSetting::D18,
    ];

    pub fn value(self) -> f64 {
        match self {
            DepthSetting::D8_1 => 8.1,
            DepthSetting::D9 => 9.0,
            DepthSetting::D10 => 10.0,
            DepthSetting::D11 => 11.0,
            DepthSetting::D12 => 12.0,
            DepthSetting::D14 => 14.0,
            DepthSetting::D16 => 16.0,
            DepthSetting::D18 => 18.0,
        }
    }

    pub fn geometry(self) -> GeometryRecord {
        // (spacing, left, top, height)
        let (s, left, top, height) = match self {
            DepthSetting::D18 => (0.319, 80, 120, 564),
            DepthSetting::D16 => (0.286, 80, 123, 560),
            DepthSetting::D14 => (0.251, 79, 127, 558),
            DepthSetting::D12 => (0.218, 74, 132, 550),
            DepthSetting::D11 => (0.200, 71, 135, 550),
            DepthSetting::D10 => (0.185, 71, 140, 542),
            DepthSetting::D9 => (0.171, 68, 153, 526),
            DepthSetting::D8_1 => (0.160, 71, 162, 506),
        };
        let roi = Roi::from_origin(left, top, ROI_WIDTH, height);
        GeometryRecord {
            spacing: [s, s, 1.0],
            roi,
            height: roi.height(),
        }
    }
}

impl TryFrom<f64> for DepthSetting {
    type Error = ResliceError;

    fn try_from(depth: f64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|setting| (setting.value() - depth).abs() < DEPTH_TOLERANCE)
            .ok_or(ResliceError::UnknownDepthSetting(depth))
    }
}

/// Look up the calibrated geometry for a raw depth value.
pub fn lookup(depth: f64) -> Result<GeometryRecord> {
    DepthSetting::try_from(depth).map(DepthSetting::geometry)
}

/// Physical centre of the probe footprint in the image frame.
///
/// The ROI centre pixel is mapped through `pixel_to_mm`; when no calibration
/// is supplied the pixel grid is assumed to be scaled by the depth spacing.
pub fn footprint_center(geometry: &GeometryRecord, pixel_to_mm: Option<&Matrix4<f64>>) -> Vector3<f64> {
    let roi = geometry.roi;
    let center_pixel = Vector4::new(
        f64::from(roi.width()) * 0.5,
        f64::from(roi.height()) * 0.5,
        0.0,
        1.0,
    );
    let [sx, sy, sz] = geometry.spacing;
    let scale = Matrix4::new_nonuniform_scaling(&Vector3::new(sx, sy, sz));
    let mm = pixel_to_mm.unwrap_or(&scale) * center_pixel;
    mm.xyz()
}
