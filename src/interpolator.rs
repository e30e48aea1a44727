use ndarray::ArrayView3;

use crate::enums::Interpolation;
use crate::volume::Scalar;

/// Tolerance on the grid bounds, in voxels.
const BOUNDS_TOLERANCE: f64 = 1e-6;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Sample `data` at a continuous `(x, y, z)` array index.
    ///
    /// Returns `None` outside the grid; the caller substitutes the background.
    #[inline]
    pub(crate) fn sample<T: Scalar>(
        data: &ArrayView3<T>,
        index: [f64; 3],
        interpolation: Interpolation,
    ) -> Option<f64> {
        let (depth, height, width) = data.dim();
        let dims = [width, height, depth];
        let inside = index.iter().zip(dims).all(|(&i, n)| {
            i >= -BOUNDS_TOLERANCE && i <= (n - 1) as f64 + BOUNDS_TOLERANCE
        });
        if !inside {
            return None;
        }

        let value = match interpolation {
            Interpolation::Nearest => Self::nearest(data, index, dims),
            Interpolation::Linear => Self::trilinear(data, index, dims),
            Interpolation::Cubic => Self::tricubic(data, index, dims),
        };
        Some(value)
    }

    #[inline]
    fn clamp_tap(i: isize, n: usize) -> usize {
        i.clamp(0, n as isize - 1) as usize
    }

    fn nearest<T: Scalar>(data: &ArrayView3<T>, index: [f64; 3], dims: [usize; 3]) -> f64 {
        let [x, y, z] = [0, 1, 2].map(|a| Self::clamp_tap(index[a].round() as isize, dims[a]));
        data[[z, y, x]].to_f64()
    }

    fn trilinear<T: Scalar>(data: &ArrayView3<T>, index: [f64; 3], dims: [usize; 3]) -> f64 {
        let mut taps = [[0usize; 2]; 3];
        let mut weights = [[0.0f64; 2]; 3];
        for axis in 0..3 {
            let base = index[axis].floor();
            let t = index[axis] - base;
            let base = base as isize;
            taps[axis] = [
                Self::clamp_tap(base, dims[axis]),
                Self::clamp_tap(base + 1, dims[axis]),
            ];
            weights[axis] = [1.0 - t, t];
        }

        let mut value = 0.0;
        for (zk, &z) in taps[2].iter().enumerate() {
            for (yk, &y) in taps[1].iter().enumerate() {
                let wzy = weights[2][zk] * weights[1][yk];
                for (xk, &x) in taps[0].iter().enumerate() {
                    value = (wzy * weights[0][xk]).mul_add(data[[z, y, x]].to_f64(), value);
                }
            }
        }
        value
    }

    /// Keys cubic convolution (a = -0.5) on the four taps around `index`.
    fn tricubic<T: Scalar>(data: &ArrayView3<T>, index: [f64; 3], dims: [usize; 3]) -> f64 {
        let mut taps = [[0usize; 4]; 3];
        let mut weights = [[0.0f64; 4]; 3];
        for axis in 0..3 {
            let base = index[axis].floor();
            weights[axis] = Self::cubic_weights(index[axis] - base);
            let base = base as isize;
            for (k, tap) in taps[axis].iter_mut().enumerate() {
                *tap = Self::clamp_tap(base - 1 + k as isize, dims[axis]);
            }
        }

        let mut value = 0.0;
        for (zk, &z) in taps[2].iter().enumerate() {
            if weights[2][zk] == 0.0 {
                continue;
            }
            for (yk, &y) in taps[1].iter().enumerate() {
                let wzy = weights[2][zk] * weights[1][yk];
                if wzy == 0.0 {
                    continue;
                }
                for (xk, &x) in taps[0].iter().enumerate() {
                    value = (wzy * weights[0][xk]).mul_add(data[[z, y, x]].to_f64(), value);
                }
            }
        }
        value
    }

    #[inline]
    pub(crate) fn cubic_weights(t: f64) -> [f64; 4] {
        let t2 = t * t;
        let t3 = t2 * t;
        [
            -0.5 * t3 + t2 - 0.5 * t,
            1.5 * t3 - 2.5 * t2 + 1.0,
            -1.5 * t3 + 2.0 * t2 + 0.5 * t,
            0.5 * t3 - 0.5 * t2,
        ]
    }
}
