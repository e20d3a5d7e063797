//! Numerical algorithms shared by the calculator models.

pub mod grid;
pub mod misc;

pub use grid::{find_indices_and_weights, RegularGrid3};
pub use misc::{arange, is_strictly_increasing, linspace, InterpError, Interpolator};
