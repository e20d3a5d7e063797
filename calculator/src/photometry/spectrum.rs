//! Physical constants, blackbody radiance and the Vega reference spectrum.

use std::path::Path;

use log::info;
use shared::algo::Interpolator;
use shared::table::{self, Table};
use shared::units::{Quantity, SpectralContext, Unit};

use super::PHOTON_FLUX_UNIT;
use crate::config::parse_unit;
use crate::error::ConfigError;

/// Constants in CGS units
pub struct CGS {}

impl CGS {
    /// Planck's constant
    /// Units: 6.62607015e-27 erg⋅s (erg-seconds in CGS)
    pub const PLANCK_CONSTANT: f64 = 6.62607015e-27;

    /// Speed of light in vacuum
    /// Units: 2.99792458e10 cm/s (centimeters per second in CGS)
    pub const SPEED_OF_LIGHT: f64 = 2.99792458e10;

    /// Boltzmann constant
    /// Units: 1.380649e-16 erg/K
    pub const BOLTZMANN_CONSTANT: f64 = 1.380649e-16;
}

/// Energy of one photon of the given wavelength, in erg.
///
/// Non-positive wavelengths give an infinite energy.
pub fn wavelength_to_ergs(wavelength_nm: f64) -> f64 {
    if wavelength_nm <= 0.0 {
        return f64::INFINITY;
    }
    let wavelength_cm = wavelength_nm * 1e-7;
    CGS::PLANCK_CONSTANT * CGS::SPEED_OF_LIGHT / wavelength_cm
}

/// Planck's law in photon form: photons s⁻¹ cm⁻² cm⁻¹ sr⁻¹.
///
/// # Arguments
///
/// * `wavelength_nm` - Wavelength in nanometers
/// * `temperature_k` - Blackbody temperature in kelvin
///
/// # Returns
///
/// `2c / λ⁴ / (exp(hc / λkT) - 1)`, or 0.0 for non-positive inputs and
/// wavelengths far on the Wien side where the exponential overflows.
pub fn planck_photon_radiance(wavelength_nm: f64, temperature_k: f64) -> f64 {
    if wavelength_nm <= 0.0 || temperature_k <= 0.0 {
        return 0.0;
    }
    let wavelength_cm = wavelength_nm * 1e-7;
    let exponent = CGS::PLANCK_CONSTANT * CGS::SPEED_OF_LIGHT
        / (wavelength_cm * CGS::BOLTZMANN_CONSTANT * temperature_k);
    let denominator = exponent.exp_m1();
    if !denominator.is_finite() {
        return 0.0;
    }
    2.0 * CGS::SPEED_OF_LIGHT / wavelength_cm.powi(4) / denominator
}

/// Vega's spectrum in photon / (s cm2 nm), used as the zero point of
/// Vega-relative magnitudes.
#[derive(Debug, Clone)]
pub struct ReferenceSpectrum {
    flux: Interpolator,
    unit: Unit,
}

impl ReferenceSpectrum {
    /// Load the reference spectrum from a tagged table on disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let table = table::read(path).map_err(|source| ConfigError::Table {
            path: display.clone(),
            source,
        })?;
        let spectrum = Self::from_table(&table, &display)?;
        let (lo, hi) = spectrum.flux.bounds();
        info!("Loaded reference spectrum {display} covering {lo}-{hi} nm");
        Ok(spectrum)
    }

    /// Build from a table whose first column is wavelength and whose flux
    /// column is a photon or energy flux density.
    pub fn from_table(table: &Table, source: &str) -> Result<Self, ConfigError> {
        let table_error = |e| ConfigError::Table {
            path: source.to_string(),
            source: e,
        };
        let unit_error = |e| ConfigError::Unit {
            field: source.to_string(),
            source: e,
        };

        let wavelength = table
            .column(&["wavelength", "wave", "lambda"])
            .or_else(|_| table.column_at(0))
            .map_err(table_error)?;
        let flux = table
            .column(&["flux", "flux_density"])
            .or_else(|_| table.column_at(1))
            .map_err(table_error)?;

        let to_nm = Quantity::new(1.0, parse_unit(source, wavelength.unit.as_deref().unwrap_or("nm"))?)
            .value_in("nm")
            .map_err(unit_error)?;
        let flux_unit = parse_unit(source, flux.unit.as_deref().unwrap_or(PHOTON_FLUX_UNIT))?;
        let target = parse_unit(source, PHOTON_FLUX_UNIT)?;

        let wavelengths = wavelength.values.iter().map(|w| w * to_nm).collect::<Vec<_>>();
        let values = wavelengths
            .iter()
            .zip(&flux.values)
            .map(|(&nm, &value)| {
                Quantity::new(value, flux_unit.clone())
                    .to_with(&target, &SpectralContext::at_nm(nm))
                    .map(|q| q.value)
                    .map_err(unit_error)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let flux = Interpolator::new(wavelengths, values).map_err(|e| ConfigError::DataShape {
            path: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            flux,
            unit: target,
        })
    }

    /// Flux at `wavelength_nm`, zero outside the tabulated coverage.
    pub fn at(&self, wavelength_nm: f64) -> f64 {
        self.flux.at_or(wavelength_nm, 0.0)
    }

    /// A conversion context at `wavelength_nm` carrying Vega's flux there.
    pub fn context(&self, wavelength_nm: f64) -> SpectralContext {
        SpectralContext::at_nm(wavelength_nm)
            .with_reference(Quantity::new(self.at(wavelength_nm), self.unit.clone()))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use test_helpers::fixture::vega_flux;
    use test_helpers::Fixture;

    use super::*;

    #[test]
    fn test_wavelength_to_ergs() {
        // 500 nm photon: h c / λ
        let expected = 6.62607015e-27 * 2.99792458e10 / 5e-5;
        assert_relative_eq!(wavelength_to_ergs(500.0), expected, max_relative = 1e-12);
        assert!(wavelength_to_ergs(0.0).is_infinite());
    }

    #[test]
    fn test_planck_peak_follows_wien() {
        // Photon-form peak sits at b / T with b ≈ 3.6697e6 nm K
        let temperature = 5800.0;
        let peak = (200..2000)
            .map(|nm| nm as f64)
            .max_by(|a, b| {
                planck_photon_radiance(*a, temperature)
                    .total_cmp(&planck_photon_radiance(*b, temperature))
            })
            .unwrap();
        assert_relative_eq!(peak, 3.6697e6 / temperature, max_relative = 2e-3);
    }

    #[test]
    fn test_planck_edge_cases() {
        assert_eq!(planck_photon_radiance(-1.0, 5800.0), 0.0);
        assert_eq!(planck_photon_radiance(1.0, 10.0), 0.0);
    }

    #[test]
    fn test_reference_spectrum_from_fixture() {
        let fixture = Fixture::new();
        let vega = ReferenceSpectrum::load(&fixture.path().join("source/vega.txt")).unwrap();
        assert_relative_eq!(vega.at(2190.0), vega_flux(2190.0), max_relative = 1e-3);
        assert_eq!(vega.at(100.0), 0.0);

        let context = vega.context(1220.0);
        let zero_mag = Quantity::parse("0 vegamag")
            .unwrap()
            .value_in_with(PHOTON_FLUX_UNIT, &context)
            .unwrap();
        assert_relative_eq!(zero_mag, vega.at(1220.0), max_relative = 1e-12);
    }

    #[test]
    fn test_reference_spectrum_converts_energy_units() {
        let table = table::text::parse("wavelength [nm] flux [erg / (s cm2 nm)]\n500 1e-9\n600 1e-9\n")
            .unwrap();
        let vega = ReferenceSpectrum::from_table(&table, "energy.txt").unwrap();
        let expected = 1e-9 / wavelength_to_ergs(500.0);
        assert_relative_eq!(vega.at(500.0), expected, max_relative = 1e-10);
    }
}
