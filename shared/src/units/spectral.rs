//! Wavelength-dependent conversions between flux-density flavours and
//! magnitude systems.
//!
//! A flux density is one of four flavours: photons or energy, per unit
//! wavelength or per unit frequency. Converting between flavours needs the
//! wavelength at which the flux is measured:
//!
//! - photon ↔ energy: `E = h c / λ`
//! - per-frequency ↔ per-wavelength: `F_λ = F_ν c / λ²`
//!
//! Any angle exponent (surface brightness per arcsec²) rides along
//! unchanged.

use super::dimension::Dimension;
use super::magnitude::{flux_to_magnitude, magnitude_to_flux, MagnitudeSystem};
use super::parser::ParsedUnit;
use super::quantity::{Quantity, Unit};
use super::UnitError;

/// Constants in SI units
pub struct SI {}

impl SI {
    /// Planck's constant
    /// Units: 6.62607015e-34 J s
    pub const PLANCK_CONSTANT: f64 = 6.62607015e-34;

    /// Speed of light in vacuum
    /// Units: 299792458 m/s
    pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

    /// Boltzmann constant
    /// Units: 1.380649e-23 J/K
    pub const BOLTZMANN_CONSTANT: f64 = 1.380649e-23;
}

/// The auxiliary values a context-dependent conversion needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralContext {
    wavelength_m: f64,
    reference: Option<Quantity>,
}

impl SpectralContext {
    /// Context at a wavelength given in nanometers.
    pub fn at_nm(wavelength_nm: f64) -> Self {
        Self {
            wavelength_m: wavelength_nm * 1e-9,
            reference: None,
        }
    }

    /// Context at a wavelength given as a length quantity.
    pub fn at_wavelength(wavelength: &Quantity) -> Result<Self, UnitError> {
        let metres = wavelength.value_in("m")?;
        Ok(Self {
            wavelength_m: metres,
            reference: None,
        })
    }

    /// Attach the Vega flux density at this wavelength, enabling Vega-relative
    /// magnitudes.
    pub fn with_reference(mut self, reference: Quantity) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn wavelength_m(&self) -> f64 {
        self.wavelength_m
    }

    pub fn reference(&self) -> Option<&Quantity> {
        self.reference.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavour {
    PhotonPerWavelength,
    PhotonPerFrequency,
    EnergyPerWavelength,
    EnergyPerFrequency,
}

impl Flavour {
    fn classify(dimension: Dimension) -> Option<(Self, i8)> {
        let (base, angle) = dimension.split_angle();
        let flavour = if base == Dimension::PHOTON_FLUX_DENSITY {
            Flavour::PhotonPerWavelength
        } else if base == Dimension::PHOTON_FNU {
            Flavour::PhotonPerFrequency
        } else if base == Dimension::ENERGY_FLUX_DENSITY {
            Flavour::EnergyPerWavelength
        } else if base == Dimension::ENERGY_FNU {
            Flavour::EnergyPerFrequency
        } else {
            return None;
        };
        Some((flavour, angle))
    }

    /// Bring an SI value of this flavour to photons per unit wavelength.
    fn to_photon_lambda(self, value: f64, wavelength_m: f64) -> f64 {
        let photon_energy = SI::PLANCK_CONSTANT * SI::SPEED_OF_LIGHT / wavelength_m;
        let nu_to_lambda = SI::SPEED_OF_LIGHT / (wavelength_m * wavelength_m);
        match self {
            Flavour::PhotonPerWavelength => value,
            Flavour::PhotonPerFrequency => value * nu_to_lambda,
            Flavour::EnergyPerWavelength => value / photon_energy,
            Flavour::EnergyPerFrequency => value * nu_to_lambda / photon_energy,
        }
    }

    fn from_photon_lambda(self, value: f64, wavelength_m: f64) -> f64 {
        let photon_energy = SI::PLANCK_CONSTANT * SI::SPEED_OF_LIGHT / wavelength_m;
        let nu_to_lambda = SI::SPEED_OF_LIGHT / (wavelength_m * wavelength_m);
        match self {
            Flavour::PhotonPerWavelength => value,
            Flavour::PhotonPerFrequency => value / nu_to_lambda,
            Flavour::EnergyPerWavelength => value * photon_energy,
            Flavour::EnergyPerFrequency => value * photon_energy / nu_to_lambda,
        }
    }
}

fn incompatible(from: &Unit, to: &Unit) -> UnitError {
    UnitError::IncompatibleUnit {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn convert_linear(
    value: f64,
    from: &ParsedUnit,
    to: &ParsedUnit,
    context: &SpectralContext,
) -> Result<f64, UnitError> {
    if from.dimension() == to.dimension() {
        return Ok(value * (from.si_factor() / to.si_factor()));
    }

    let fail = || incompatible(&Unit::Linear(from.clone()), &Unit::Linear(to.clone()));
    let (from_flavour, from_angle) = Flavour::classify(from.dimension()).ok_or_else(fail)?;
    let (to_flavour, to_angle) = Flavour::classify(to.dimension()).ok_or_else(fail)?;
    if from_angle != to_angle {
        return Err(fail());
    }

    let wavelength = context.wavelength_m();
    let photon_lambda = from_flavour.to_photon_lambda(value * from.si_factor(), wavelength);
    Ok(to_flavour.from_photon_lambda(photon_lambda, wavelength) / to.si_factor())
}

/// The zero-point flux of `system` at the context, with its unit.
fn zero_point(
    system: MagnitudeSystem,
    context: &SpectralContext,
) -> Result<(ParsedUnit, f64), UnitError> {
    if let Some(fixed) = system.zero_point() {
        return fixed;
    }
    match context.reference() {
        Some(Quantity {
            value,
            unit: Unit::Linear(unit),
        }) => Ok((unit.clone(), *value)),
        _ => Err(UnitError::MissingReference {
            from: system.to_string(),
            to: "flux density".to_string(),
        }),
    }
}

/// Convert `quantity` to `target`, resolving spectral flavours and
/// magnitude systems through `context`.
pub(crate) fn convert(
    quantity: &Quantity,
    target: &Unit,
    context: &SpectralContext,
) -> Result<Quantity, UnitError> {
    let value = match (&quantity.unit, target) {
        (Unit::Linear(from), Unit::Linear(to)) => convert_linear(quantity.value, from, to, context)?,
        (Unit::Magnitude(from), Unit::Magnitude(to)) if from == to => quantity.value,
        (Unit::Magnitude(system), Unit::Linear(to)) => {
            let (zero_unit, zero) = zero_point(*system, context)?;
            let flux = magnitude_to_flux(quantity.value, zero);
            convert_linear(flux, &zero_unit, to, context)?
        }
        (Unit::Linear(from), Unit::Magnitude(system)) => {
            let (zero_unit, zero) = zero_point(*system, context)?;
            let flux = convert_linear(quantity.value, from, &zero_unit, context)?;
            flux_to_magnitude(flux, zero)
        }
        (Unit::Magnitude(from), Unit::Magnitude(to)) => {
            let (from_unit, from_zero) = zero_point(*from, context)?;
            let (to_unit, to_zero) = zero_point(*to, context)?;
            let flux = magnitude_to_flux(quantity.value, from_zero);
            let flux = convert_linear(flux, &from_unit, &to_unit, context)?;
            flux_to_magnitude(flux, to_zero)
        }
    };
    Ok(Quantity::new(value, target.clone()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn unit(text: &str) -> Unit {
        text.parse().unwrap()
    }

    #[test]
    fn test_ab_magnitude_to_photon_flux_density() {
        let mag = Quantity::parse("20 magab").unwrap();
        let ctx = SpectralContext::at_nm(2190.0);
        let flux = mag.to_with(&unit("photon / (s cm2 nm)"), &ctx).unwrap();

        // F_ν / (h λ), then m⁻² m⁻¹ → cm⁻² nm⁻¹
        let f_nu = 3631e-26 * 1e-8;
        let expected = f_nu / (SI::PLANCK_CONSTANT * 2190e-9) * 1e-4 * 1e-9;
        assert_relative_eq!(flux.value, expected, max_relative = 1e-10);
    }

    #[test]
    fn test_ab_magnitude_depends_on_wavelength() {
        let mag = Quantity::parse("20 mag(AB)").unwrap();
        let target = unit("photlam");
        let blue = mag.to_with(&target, &SpectralContext::at_nm(1000.0)).unwrap();
        let red = mag.to_with(&target, &SpectralContext::at_nm(2000.0)).unwrap();
        assert_relative_eq!(blue.value / red.value, 2.0, max_relative = 1e-10);
    }

    #[test]
    fn test_st_zero_magnitude_is_zero_point() {
        let mag = Quantity::parse("0 STmag").unwrap();
        let flam = mag
            .to_with(&unit("flam"), &SpectralContext::at_nm(550.0))
            .unwrap();
        assert_relative_eq!(flam.value, 3.630780547701e-9, max_relative = 1e-9);
    }

    #[test]
    fn test_jansky_to_flam() {
        let jy = Quantity::parse("1 Jy").unwrap();
        let flam = jy
            .to_with(&unit("erg / (s cm2 AA)"), &SpectralContext::at_nm(500.0))
            .unwrap();
        // 1e-23 erg/s/cm²/Hz · c / λ², per Å
        let expected = 1e-23 * 2.99792458e10 / (5e-5 * 5e-5) * 1e-8;
        assert_relative_eq!(flam.value, expected, max_relative = 1e-10);
    }

    #[test]
    fn test_flam_photlam_round_trip() {
        let ctx = SpectralContext::at_nm(650.0);
        let flam = Quantity::new(2.0e-16, unit("flam"));
        let photlam = flam.to_with(&unit("photlam"), &ctx).unwrap();
        let back = photlam.to_with(&unit("flam"), &ctx).unwrap();
        assert_relative_eq!(back.value, 2.0e-16, max_relative = 1e-12);
    }

    #[test]
    fn test_vega_magnitudes_need_reference() {
        let mag = Quantity::parse("2.5 vegamag").unwrap();
        let bare = SpectralContext::at_nm(550.0);
        assert!(matches!(
            mag.to_with(&unit("photlam"), &bare),
            Err(UnitError::MissingReference { .. })
        ));

        let ctx = bare.with_reference(Quantity::new(5.0, unit("photlam")));
        let flux = mag.to_with(&unit("photlam"), &ctx).unwrap();
        assert_relative_eq!(flux.value, 0.5, max_relative = 1e-12);

        let back = flux.to_with(&unit("mag(Vega)"), &ctx).unwrap();
        assert_relative_eq!(back.value, 2.5, max_relative = 1e-12);
    }

    #[test]
    fn test_ab_to_vega_through_reference() {
        let ctx = SpectralContext::at_nm(550.0);
        let ab_zero = Quantity::parse("0 magab")
            .unwrap()
            .to_with(&unit("photlam"), &ctx)
            .unwrap();
        let ctx = ctx.with_reference(ab_zero);
        let vega = Quantity::parse("3 magab")
            .unwrap()
            .to_with(&unit("vegamag"), &ctx)
            .unwrap();
        assert_relative_eq!(vega.value, 3.0, max_relative = 1e-10);
    }

    #[test]
    fn test_bolometric_is_not_a_flux_density() {
        let ctx = SpectralContext::at_nm(550.0);
        let mag = Quantity::parse("0 magbol").unwrap();
        let flux = mag.to_with(&unit("W / m2"), &ctx).unwrap();
        assert_relative_eq!(flux.value, 2.518021002e-8, max_relative = 1e-12);
        assert!(matches!(
            mag.to_with(&unit("photlam"), &ctx),
            Err(UnitError::IncompatibleUnit { .. })
        ));
    }

    #[test]
    fn test_surface_brightness_keeps_angle() {
        let ctx = SpectralContext::at_nm(1600.0);
        let sky = Quantity::parse("1 erg / (s cm2 AA arcsec2)").unwrap();
        let photons = sky
            .to_with(&unit("photon / (s cm2 nm arcsec2)"), &ctx)
            .unwrap();
        let photon_energy = 6.62607015e-27 * 2.99792458e10 / 1.6e-4;
        assert_relative_eq!(photons.value, 10.0 / photon_energy, max_relative = 1e-10);

        assert!(sky.to_with(&unit("photlam"), &ctx).is_err());
    }
}
