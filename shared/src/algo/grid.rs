//! Interpolation over regular rectilinear grids.
//!
//! Values are stored in a dense `ndarray::Array3` indexed by three sorted
//! axes. Queries find the bracketing indices on each axis and blend the
//! eight surrounding corners.

use ndarray::Array3;

use super::misc::{is_strictly_increasing, InterpError};

/// Find the bracketing indices around `value` and the weight of the lower one.
///
/// Returns `(lower, upper, lower_weight)`. An exact hit on a grid node returns
/// the same index twice with weight `1.0`, so stored cells are reproduced
/// bit-for-bit.
pub fn find_indices_and_weights(axis: &[f64], value: f64) -> Option<(usize, usize, f64)> {
    if axis.is_empty() || value.is_nan() {
        return None;
    }
    if value < axis[0] || value > axis[axis.len() - 1] {
        return None;
    }
    if axis.len() == 1 {
        return Some((0, 0, 1.0));
    }

    let mut lower_idx = 0;
    let mut upper_idx = axis.len() - 1;

    while upper_idx - lower_idx > 1 {
        let mid_idx = (lower_idx + upper_idx) / 2;
        if axis[mid_idx] <= value {
            lower_idx = mid_idx;
        } else {
            upper_idx = mid_idx;
        }
    }

    if axis[lower_idx] == value {
        return Some((lower_idx, lower_idx, 1.0));
    }
    if axis[upper_idx] == value {
        return Some((upper_idx, upper_idx, 1.0));
    }

    let weight = (value - axis[lower_idx]) / (axis[upper_idx] - axis[lower_idx]);
    Some((lower_idx, upper_idx, 1.0 - weight))
}

/// A dense 3-D table sampled on three strictly increasing axes.
#[derive(Debug, Clone)]
pub struct RegularGrid3 {
    axes: [Vec<f64>; 3],
    values: Array3<f64>,
}

impl RegularGrid3 {
    /// Wrap `values`, whose shape must be `(axes[0].len(), axes[1].len(), axes[2].len())`.
    pub fn new(axes: [Vec<f64>; 3], values: Array3<f64>) -> Result<Self, InterpError> {
        let shape = values.shape();
        if axes.iter().zip(shape).any(|(axis, &len)| axis.len() != len) {
            return Err(InterpError::MismatchedLengths);
        }
        if axes.iter().any(|axis| axis.is_empty()) {
            return Err(InterpError::InsufficientData);
        }
        if axes.iter().any(|axis| !is_strictly_increasing(axis)) {
            return Err(InterpError::UnsortedData);
        }
        Ok(Self { axes, values })
    }

    pub fn axis(&self, dim: usize) -> &[f64] {
        &self.axes[dim]
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Trilinear interpolation at `(x, y, z)`.
    ///
    /// Returns `None` when any coordinate lies outside its axis.
    pub fn at(&self, x: f64, y: f64, z: f64) -> Option<f64> {
        let (x0, x1, wx) = find_indices_and_weights(&self.axes[0], x)?;
        let (y0, y1, wy) = find_indices_and_weights(&self.axes[1], y)?;
        let (z0, z1, wz) = find_indices_and_weights(&self.axes[2], z)?;

        let mut total = 0.0;
        for (i, wi) in [(x0, wx), (x1, 1.0 - wx)] {
            for (j, wj) in [(y0, wy), (y1, 1.0 - wy)] {
                for (k, wk) in [(z0, wz), (z1, 1.0 - wz)] {
                    let weight = wi * wj * wk;
                    if weight != 0.0 {
                        total += weight * self.values[[i, j, k]];
                    }
                }
            }
        }
        Some(total)
    }

    /// Interpolate along the third axis at a fixed `(x, y)`.
    ///
    /// Query points outside the third axis yield `fill`. Returns `None` when
    /// `(x, y)` itself is outside the grid.
    pub fn sample_z(&self, x: f64, y: f64, zs: &[f64], fill: f64) -> Option<Vec<f64>> {
        find_indices_and_weights(&self.axes[0], x)?;
        find_indices_and_weights(&self.axes[1], y)?;
        Some(
            zs.iter()
                .map(|&z| self.at(x, y, z).unwrap_or(fill))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array3;

    use super::*;

    fn linear_grid() -> RegularGrid3 {
        let axes = [vec![1.0, 1.5, 2.0], vec![1.0, 3.0, 5.0], vec![10.0, 20.0, 30.0, 40.0]];
        let values = Array3::from_shape_fn((3, 3, 4), |(i, j, k)| {
            axes[0][i] * 100.0 + axes[1][j] * 10.0 + axes[2][k]
        });
        RegularGrid3::new(axes, values).unwrap()
    }

    #[test]
    fn test_find_indices_exact_hit() {
        let axis = [1.0, 1.5, 2.0];
        assert_eq!(find_indices_and_weights(&axis, 1.5), Some((1, 1, 1.0)));
        assert_eq!(find_indices_and_weights(&axis, 2.0), Some((2, 2, 1.0)));
        assert_eq!(find_indices_and_weights(&axis, 1.0), Some((0, 0, 1.0)));
    }

    #[test]
    fn test_find_indices_between() {
        let (lo, hi, w) = find_indices_and_weights(&[1.0, 1.5, 2.0], 1.3).unwrap();
        assert_eq!((lo, hi), (0, 1));
        assert_relative_eq!(w, 0.4, max_relative = 1e-12);
        assert!(find_indices_and_weights(&[1.0, 2.0], 2.5).is_none());
        assert!(find_indices_and_weights(&[1.0, 2.0], f64::NAN).is_none());
    }

    #[test]
    fn test_trilinear_reproduces_linear_function() {
        let grid = linear_grid();
        let value = grid.at(1.3, 2.0, 25.0).unwrap();
        assert_relative_eq!(value, 130.0 + 20.0 + 25.0, max_relative = 1e-12);
    }

    #[test]
    fn test_exact_node_is_stored_value() {
        let grid = linear_grid();
        assert_eq!(grid.at(1.5, 3.0, 30.0), Some(grid.values()[[1, 1, 2]]));
    }

    #[test]
    fn test_sample_z_fills_outside() {
        let grid = linear_grid();
        let out = grid.sample_z(1.0, 1.0, &[5.0, 10.0, 40.0, 41.0], 0.0).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert_relative_eq!(out[1], 120.0);
        assert_relative_eq!(out[2], 150.0);
        assert_eq!(out[3], 0.0);
        assert!(grid.sample_z(0.5, 1.0, &[10.0], 0.0).is_none());
    }

    #[test]
    fn test_shape_validation() {
        let values = Array3::zeros((2, 2, 2));
        assert_eq!(
            RegularGrid3::new([vec![1.0, 2.0], vec![1.0], vec![1.0, 2.0]], values.clone())
                .unwrap_err(),
            InterpError::MismatchedLengths
        );
        assert_eq!(
            RegularGrid3::new([vec![2.0, 1.0], vec![1.0, 2.0], vec![1.0, 2.0]], values)
                .unwrap_err(),
            InterpError::UnsortedData
        );
    }
}
