//! Reslice axes from a tracked probe pose.
//!
//! The pose maps the probe (image) frame to the world frame in RAS. The
//! resampler works in LPS and expresses its axes relative to the volume
//! centre, so each pose is converted, optionally pushed along its own z axis
//! by a slab offset, and conjugated by a translation to the volume centre.

use log::debug;
use nalgebra::{Matrix4, Vector3, Vector4};

use crate::convention;
use crate::error::{ResliceError, Result};

/// Build the reslice axes for `pose` (probe-to-world, RAS).
///
/// `slab_offset_z` is the physical shift along the pose's local z axis; zero
/// gives the primary reslice.
pub fn build(
    pose: &Matrix4<f64>,
    volume_center: &Vector3<f64>,
    slab_offset_z: f64,
) -> Result<Matrix4<f64>> {
    if !is_finite(pose) || !volume_center.iter().all(|v| v.is_finite()) || !slab_offset_z.is_finite()
    {
        return Err(ResliceError::NonInvertibleTransform);
    }

    let mut shifted = convention::convert(pose);
    let position = shifted * Vector4::new(0.0, 0.0, slab_offset_z, 1.0);
    shifted.set_column(3, &position);

    let inverted = invert(&shifted)?;
    let to_center = Matrix4::new_translation(volume_center);
    let from_center = Matrix4::new_translation(&-volume_center);
    let axes = invert(&(to_center * inverted * from_center))?;

    debug!("reslice axes (slab offset {slab_offset_z}): {axes}");
    Ok(axes)
}

/// Reslice axes for every slab offset in `-slab_num..=slab_num`, paired with
/// the offset index.
pub fn build_slab(
    pose: &Matrix4<f64>,
    volume_center: &Vector3<f64>,
    spacing_z: f64,
    slab_num: u32,
) -> Result<Vec<(i32, Matrix4<f64>)>> {
    let n = slab_num as i32;
    (-n..=n)
        .map(|offset| Ok((offset, build(pose, volume_center, f64::from(offset) * spacing_z)?)))
        .collect()
}

fn invert(m: &Matrix4<f64>) -> Result<Matrix4<f64>> {
    let inverse = m.try_inverse().ok_or(ResliceError::NonInvertibleTransform)?;
    if is_finite(&inverse) {
        Ok(inverse)
    } else {
        Err(ResliceError::NonInvertibleTransform)
    }
}

pub(crate) fn is_finite(m: &Matrix4<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}
