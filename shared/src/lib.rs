//! Foundations shared by the exposure time calculator: physical units,
//! interpolation algorithms and readers for tabulated data files.

pub mod algo;
pub mod table;
pub mod units;
