//! Insight text transform files as exchanged with the visualization platform.
//!
//! ```text
//! #Insight Transform File V1.0
//! #Transform 0
//! Transform: AffineTransform_double_3_3
//! Parameters: r00 r01 r02 r10 r11 r12 r20 r21 r22 tx ty tz
//! FixedParameters: 0 0 0
//! ```
//!
//! The stored parameters are the inverse of the forward (child to parent)
//! transform, in LPS.

use std::fs;
use std::path::Path;

use log::debug;
use nalgebra::Matrix4;

use crate::error::{ResliceError, Result};

const PARAMETERS_LINE: usize = 3;

/// Read a transform file and return the forward LPS matrix.
pub fn read_slicer_transform(path: impl AsRef<Path>) -> Result<Matrix4<f64>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ResliceError::io(path, e))?;
    let malformed = |reason: String| ResliceError::MalformedTransformFile {
        path: path.to_path_buf(),
        reason,
    };

    let line = text
        .lines()
        .nth(PARAMETERS_LINE)
        .ok_or_else(|| malformed(format!("expected at least {} lines", PARAMETERS_LINE + 1)))?;
    let values = line
        .trim()
        .strip_prefix("Parameters:")
        .ok_or_else(|| malformed(format!("line {} is not a Parameters line", PARAMETERS_LINE + 1)))?;
    let p = values
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| malformed(format!("bad parameter '{v}'")))
        })
        .collect::<Result<Vec<f64>>>()?;
    if p.len() != 12 {
        return Err(malformed(format!("expected 12 parameters, found {}", p.len())));
    }
    if p.iter().any(|v| !v.is_finite()) {
        return Err(malformed("non-finite parameter".into()));
    }

    let stored = Matrix4::new(
        p[0], p[1], p[2], p[9], //
        p[3], p[4], p[5], p[10], //
        p[6], p[7], p[8], p[11], //
        0.0, 0.0, 0.0, 1.0,
    );
    let forward = stored
        .try_inverse()
        .ok_or(ResliceError::NonInvertibleTransform)?;
    debug!("read transform {}: {forward}", path.display());
    Ok(forward)
}

/// Render the file contents for a forward LPS matrix.
pub fn format_slicer_transform(forward_lps: &Matrix4<f64>) -> Result<String> {
    let inv = forward_lps
        .try_inverse()
        .ok_or(ResliceError::NonInvertibleTransform)?;
    let parameters = [
        inv[(0, 0)],
        inv[(0, 1)],
        inv[(0, 2)],
        inv[(1, 0)],
        inv[(1, 1)],
        inv[(1, 2)],
        inv[(2, 0)],
        inv[(2, 1)],
        inv[(2, 2)],
        inv[(0, 3)],
        inv[(1, 3)],
        inv[(2, 3)],
    ]
    // drop the sign of negative zeros left by the inversion
    .map(|v| (if v == 0.0 { 0.0f64 } else { v }).to_string())
    .join(" ");

    Ok(format!(
        "#Insight Transform File V1.0\n\
         #Transform 0\n\
         Transform: AffineTransform_double_3_3\n\
         Parameters: {parameters}\n\
         FixedParameters: 0 0 0\n"
    ))
}

pub fn write_slicer_transform(forward_lps: &Matrix4<f64>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let contents = format_slicer_transform(forward_lps)?;
    fs::write(path, contents).map_err(|e| ResliceError::io(path, e))
}
