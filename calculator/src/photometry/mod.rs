//! Photometry models: physical constants, the Vega reference spectrum and
//! the spectral shapes a source can take.

pub mod generators;
pub mod spectrum;

pub use generators::{
    Blackbody, EmissionLine, Flat, GeneratorContext, ParameterSpec, PowerLaw, SourceGenerator,
    Template,
};
pub use spectrum::{planck_photon_radiance, wavelength_to_ergs, ReferenceSpectrum, CGS};

/// Internal unit of source flux density.
pub const PHOTON_FLUX_UNIT: &str = "photon / (s cm2 nm)";
