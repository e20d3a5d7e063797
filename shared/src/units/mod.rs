//! Physical quantities with runtime-parsed units.
//!
//! Values arrive from settings documents, data-file headers and user
//! parameters as strings such as `"0.8 arcsec"`, `"20 mag(AB)"` or
//! `"photon / (s arcsec2 nm m2)"`, so units are resolved at runtime
//! rather than through compile-time unit types.
//!
//! Two layers of conversion are provided:
//!
//! - [`Quantity::to`] converts between units of identical dimension.
//! - [`Quantity::to_with`] additionally resolves flux-density flavours
//!   (photon/energy, per-wavelength/per-frequency) and magnitude systems
//!   using a [`SpectralContext`] that carries the wavelength and, for
//!   Vega-relative magnitudes, a reference spectrum value.

pub mod dimension;
pub mod magnitude;
pub mod parser;
pub mod quantity;
pub mod registry;
pub mod spectral;

pub use dimension::Dimension;
pub use magnitude::MagnitudeSystem;
pub use parser::ParsedUnit;
pub use quantity::{Quantity, Unit};
pub use spectral::{SpectralContext, SI};

use thiserror::Error;

/// Errors raised while parsing or converting units.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("cannot parse '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("cannot convert {from} to {to}")]
    IncompatibleUnit { from: String, to: String },

    #[error("unit mismatch in {op}: '{lhs}' and '{rhs}'")]
    UnitMismatch {
        op: &'static str,
        lhs: String,
        rhs: String,
    },

    #[error("converting {from} to {to} requires a reference spectrum")]
    MissingReference { from: String, to: String },
}
