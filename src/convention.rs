//! RAS <-> LPS conversion.
//!
//! Both conventions are right handed and differ by the sign of the first two
//! axes, so a pose converts by conjugation with `S = diag(-1, -1, 1, 1)`.
//! The operation is its own inverse.

use nalgebra::{Matrix4, Vector3, Vector4};

use crate::enums::Convention;

fn sign_flip() -> Matrix4<f64> {
    Matrix4::from_diagonal(&Vector4::new(-1.0, -1.0, 1.0, 1.0))
}

/// Convert a pose between RAS and LPS (either direction).
pub fn convert(m: &Matrix4<f64>) -> Matrix4<f64> {
    let s = sign_flip();
    s * m * s
}

pub fn convert_point(p: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(-p.x, -p.y, p.z)
}

/// Express `m` (given in `from`) in the `to` convention.
pub fn to_convention(m: &Matrix4<f64>, from: Convention, to: Convention) -> Matrix4<f64> {
    if from == to { *m } else { convert(m) }
}
