//! Miscellaneous mathematical and utility algorithms.
//!
//! This module provides general-purpose numerical helpers used across the
//! calculator:
//!
//! - **Linear interpolation**: validated 1D interpolation with binary search
//! - **Sample grids**: `linspace` and `arange` style grid construction
//! - **Ordering checks**: strict monotonicity of index axes

use itertools::Itertools;
use thiserror::Error;

/// Errors that can occur during interpolation operations.
///
/// This enum provides detailed error information for interpolation failures,
/// allowing callers to handle different error conditions appropriately.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("Value {0} is out of bounds for interpolation range [{1}, {2}]")]
    OutOfBounds(f64, f64, f64),
    #[error("Input vectors must have at least 2 points")]
    InsufficientData,
    #[error("Input vectors must have the same length")]
    MismatchedLengths,
    #[error("X values must be sorted in ascending order")]
    UnsortedData,
    #[error("Input vectors must not contain NaN or infinite values")]
    NonFinite,
}

/// True when every element is strictly greater than the one before it.
pub fn is_strictly_increasing(values: &[f64]) -> bool {
    values.iter().tuple_windows().all(|(a, b)| b > a)
}

/// `count` evenly spaced samples from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        stop
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}

/// Samples `start, start + step, ...` strictly below `stop`.
///
/// The sample count is rounded to absorb floating point noise in
/// `(stop - start) / step`, so `arange(900.0, 2500.0, 10.0)` has exactly
/// 160 samples.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop <= start {
        return Vec::new();
    }
    let span = (stop - start) / step;
    let rounded = span.round();
    let count = if (span - rounded).abs() < 1e-9 {
        rounded as usize
    } else {
        span.ceil() as usize
    };
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Piecewise-linear interpolation over a validated table.
///
/// Validation happens once at construction, so repeated queries over a
/// wavelength grid only pay for the binary search.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Interpolator {
    /// Build an interpolator from matched x/y tables.
    ///
    /// # Arguments
    ///
    /// * `xs` - Array of x-coordinates (must be strictly ascending)
    /// * `ys` - Array of corresponding y-values (must match length of xs)
    ///
    /// # Errors
    ///
    /// * `InterpError::MismatchedLengths` - xs and ys have different lengths
    /// * `InterpError::InsufficientData` - Less than 2 data points provided
    /// * `InterpError::UnsortedData` - xs array is not strictly ascending
    /// * `InterpError::NonFinite` - a coordinate or value is NaN or infinite
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self, InterpError> {
        if xs.len() != ys.len() {
            return Err(InterpError::MismatchedLengths);
        }
        if xs.len() < 2 {
            return Err(InterpError::InsufficientData);
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(InterpError::NonFinite);
        }
        if !is_strictly_increasing(&xs) {
            return Err(InterpError::UnsortedData);
        }
        Ok(Self { xs, ys })
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Inclusive x range covered by the table.
    pub fn bounds(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    /// Interpolated value at `x`.
    ///
    /// # Returns
    ///
    /// * `Ok(f64)` - The interpolated y-value at position x
    /// * `Err(InterpError::OutOfBounds)` - x lies outside the table
    pub fn at(&self, x: f64) -> Result<f64, InterpError> {
        let (min_x, max_x) = self.bounds();
        if !(min_x..=max_x).contains(&x) {
            return Err(InterpError::OutOfBounds(x, min_x, max_x));
        }

        // Binary search for the correct interval
        let idx = self.xs.partition_point(|&v| v < x);
        if self.xs[idx] == x {
            return Ok(self.ys[idx]);
        }

        let (x1, x2) = (self.xs[idx - 1], self.xs[idx]);
        let (y1, y2) = (self.ys[idx - 1], self.ys[idx]);
        let t = (x - x1) / (x2 - x1);
        Ok(y1 + t * (y2 - y1))
    }

    /// Interpolated value at `x`, or `fill` outside the table.
    pub fn at_or(&self, x: f64, fill: f64) -> f64 {
        self.at(x).unwrap_or(fill)
    }

    /// Interpolated value at `x`, holding the edge values outside the table.
    pub fn at_clamped(&self, x: f64) -> f64 {
        let (min_x, max_x) = self.bounds();
        self.at_or(x.clamp(min_x, max_x), f64::NAN)
    }

    /// Evaluate at every query point, substituting `fill` outside the table.
    pub fn sample(&self, xs: &[f64], fill: f64) -> Vec<f64> {
        xs.iter().map(|&x| self.at_or(x, fill)).collect()
    }
}
