//! Spectral shapes of a source.
//!
//! Every generator returns photon / (s cm2 nm) on the requested wavelength
//! grid, scaled so that the flux at the reference band wavelength follows
//! the source brightness. Redshift stretches the shape by `1 + z`.

use std::collections::BTreeMap;
use std::fmt::Debug;

use shared::algo::Interpolator;
use shared::table::Table;
use shared::units::{Quantity, Unit};

use super::spectrum::{planck_photon_radiance, ReferenceSpectrum};
use super::PHOTON_FLUX_UNIT;
use crate::error::SourceError;
use crate::record_warning;

/// A generator parameter and the unit its value is held in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub positive: bool,
}

/// The source state a generator needs to evaluate its shape.
#[derive(Debug, Clone)]
pub struct GeneratorContext<'a> {
    /// Brightness at the reference wavelength, photon / (s cm2 nm)
    pub brightness: f64,
    pub reference_nm: f64,
    pub redshift: f64,
    /// Generator parameters keyed by [`ParameterSpec::name`]
    pub parameters: &'a BTreeMap<String, f64>,
}

impl GeneratorContext<'_> {
    fn parameter(&self, name: &str) -> f64 {
        self.parameters.get(name).copied().unwrap_or(f64::NAN)
    }

    fn rest_frame(&self, wavelength_nm: f64) -> f64 {
        wavelength_nm / (1.0 + self.redshift)
    }
}

/// A spectral shape selectable as a source type.
pub trait SourceGenerator: Debug + Send + Sync {
    /// Parameters this generator reads from the context.
    fn parameters(&self) -> &[ParameterSpec] {
        &[]
    }

    /// Flux density in photon / (s cm2 nm) at each wavelength (nm).
    fn flux(
        &self,
        wavelengths: &[f64],
        context: &GeneratorContext,
        warnings: &mut Vec<String>,
    ) -> Vec<f64>;
}

/// Scale `shape` so that its value at the reference wavelength equals the brightness.
fn normalized(
    wavelengths: &[f64],
    context: &GeneratorContext,
    shape: impl Fn(f64) -> f64,
) -> Option<Vec<f64>> {
    let norm = shape(context.rest_frame(context.reference_nm));
    if !(norm > 0.0) || !norm.is_finite() {
        return None;
    }
    Some(
        wavelengths
            .iter()
            .map(|&nm| context.brightness * shape(context.rest_frame(nm)) / norm)
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Blackbody;

impl SourceGenerator for Blackbody {
    fn parameters(&self) -> &[ParameterSpec] {
        &[ParameterSpec {
            name: "temperature",
            unit: "K",
            positive: true,
        }]
    }

    fn flux(
        &self,
        wavelengths: &[f64],
        context: &GeneratorContext,
        warnings: &mut Vec<String>,
    ) -> Vec<f64> {
        let temperature = context.parameter("temperature");
        normalized(wavelengths, context, |nm| planck_photon_radiance(nm, temperature))
            .unwrap_or_else(|| {
                record_warning(
                    warnings,
                    format!(
                        "a {temperature} K blackbody has no flux at {} nm",
                        context.reference_nm
                    ),
                );
                vec![0.0; wavelengths.len()]
            })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerLaw;

impl SourceGenerator for PowerLaw {
    fn parameters(&self) -> &[ParameterSpec] {
        &[ParameterSpec {
            name: "index",
            unit: "",
            positive: false,
        }]
    }

    fn flux(&self, wavelengths: &[f64], context: &GeneratorContext, _: &mut Vec<String>) -> Vec<f64> {
        let index = context.parameter("index");
        wavelengths
            .iter()
            .map(|&nm| context.brightness * (nm / context.reference_nm).powf(index))
            .collect()
    }
}

/// Gaussian line centred on the reference wavelength in the rest frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmissionLine;

impl SourceGenerator for EmissionLine {
    fn parameters(&self) -> &[ParameterSpec] {
        &[ParameterSpec {
            name: "width",
            unit: "nm",
            positive: true,
        }]
    }

    fn flux(&self, wavelengths: &[f64], context: &GeneratorContext, _: &mut Vec<String>) -> Vec<f64> {
        // FWHM to standard deviation
        let sigma = context.parameter("width") / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt());
        wavelengths
            .iter()
            .map(|&nm| {
                let offset = context.rest_frame(nm) - context.reference_nm;
                context.brightness * (-offset * offset / (2.0 * sigma * sigma)).exp()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Flat;

impl SourceGenerator for Flat {
    fn flux(&self, wavelengths: &[f64], context: &GeneratorContext, _: &mut Vec<String>) -> Vec<f64> {
        vec![context.brightness; wavelengths.len()]
    }
}

/// A tabulated spectrum whose shape is rescaled to the source brightness.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    flux: Interpolator,
}

impl Template {
    /// Build a template from a table of wavelength and flux.
    ///
    /// Flux columns in energy units or magnitudes are converted row by row
    /// at the row's wavelength. Columns without units are taken to be nm and
    /// photon / (s cm2 nm).
    pub fn from_table(
        name: &str,
        table: &Table,
        reference: &ReferenceSpectrum,
    ) -> Result<Self, SourceError> {
        let template_error = |reason: String| SourceError::Template {
            name: name.to_string(),
            reason,
        };

        let wavelength = table
            .column(&["wavelength", "wave", "lambda"])
            .or_else(|_| table.column_at(0))
            .map_err(|e| template_error(e.to_string()))?;
        let flux = table
            .column(&["flux", "flux_density", "fnu", "flam"])
            .or_else(|_| table.column_at(1))
            .map_err(|e| template_error(e.to_string()))?;

        let to_nm = Quantity::new(1.0, Unit::parse(wavelength.unit.as_deref().unwrap_or("nm"))?)
            .value_in("nm")?;
        let flux_unit = Unit::parse(flux.unit.as_deref().unwrap_or(PHOTON_FLUX_UNIT))?;
        let target = Unit::parse(PHOTON_FLUX_UNIT)?;

        let wavelengths = wavelength.values.iter().map(|w| w * to_nm).collect::<Vec<_>>();
        let values = wavelengths
            .iter()
            .zip(&flux.values)
            .map(|(&nm, &value)| {
                Quantity::new(value, flux_unit.clone())
                    .to_with(&target, &reference.context(nm))
                    .map(|q| q.value)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let flux = Interpolator::new(wavelengths, values).map_err(|e| template_error(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            flux,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rest-frame wavelength coverage in nm.
    pub fn bounds(&self) -> (f64, f64) {
        self.flux.bounds()
    }
}

impl SourceGenerator for Template {
    fn flux(
        &self,
        wavelengths: &[f64],
        context: &GeneratorContext,
        warnings: &mut Vec<String>,
    ) -> Vec<f64> {
        let reference = context.rest_frame(context.reference_nm);
        let (lo, hi) = self.flux.bounds();
        if !(lo..=hi).contains(&reference) {
            record_warning(
                warnings,
                format!(
                    "template {} covers {lo}-{hi} nm; normalizing at the edge nearest {reference} nm",
                    self.name
                ),
            );
        }
        let norm = self.flux.at_clamped(reference);
        if !(norm > 0.0) {
            record_warning(
                warnings,
                format!(
                    "template {} has no flux at the reference wavelength; flux set to zero",
                    self.name
                ),
            );
            return vec![0.0; wavelengths.len()];
        }
        wavelengths
            .iter()
            .map(|&nm| context.brightness * self.flux.at_or(context.rest_frame(nm), 0.0) / norm)
            .collect()
    }
}
