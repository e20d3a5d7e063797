//! Physical dimensions as integer exponents of the base quantities.
//!
//! The base set covers what a radiometric calculation needs: mass, length,
//! time and temperature for energy and flux, plane angle for sky areas, and a
//! count dimension shared by photons, electrons and ADU.

use std::fmt;
use std::ops::{Div, Mul};

/// Exponents of the base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    pub mass: i8,
    pub length: i8,
    pub time: i8,
    pub temperature: i8,
    pub angle: i8,
    pub count: i8,
}

impl Dimension {
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8, angle: i8, count: i8) -> Self {
        Self {
            mass,
            length,
            time,
            temperature,
            angle,
            count,
        }
    }

    pub const fn dimensionless() -> Self {
        Self::new(0, 0, 0, 0, 0, 0)
    }

    pub const MASS: Self = Self::new(1, 0, 0, 0, 0, 0);
    pub const LENGTH: Self = Self::new(0, 1, 0, 0, 0, 0);
    pub const TIME: Self = Self::new(0, 0, 1, 0, 0, 0);
    pub const TEMPERATURE: Self = Self::new(0, 0, 0, 1, 0, 0);
    pub const ANGLE: Self = Self::new(0, 0, 0, 0, 1, 0);
    pub const COUNT: Self = Self::new(0, 0, 0, 0, 0, 1);

    pub const AREA: Self = Self::new(0, 2, 0, 0, 0, 0);
    pub const FREQUENCY: Self = Self::new(0, 0, -1, 0, 0, 0);
    pub const ENERGY: Self = Self::new(1, 2, -2, 0, 0, 0);
    pub const POWER: Self = Self::new(1, 2, -3, 0, 0, 0);

    /// Energy per unit time and area, e.g. W m⁻²
    pub const ENERGY_FLUX: Self = Self::new(1, 0, -3, 0, 0, 0);

    /// Photons per unit time, area and wavelength
    pub const PHOTON_FLUX_DENSITY: Self = Self::new(0, -3, -1, 0, 0, 1);

    /// Photons per unit time, area and frequency
    pub const PHOTON_FNU: Self = Self::new(0, -2, 0, 0, 0, 1);

    /// Energy per unit time, area and wavelength
    pub const ENERGY_FLUX_DENSITY: Self = Self::new(1, -1, -3, 0, 0, 0);

    /// Energy per unit time, area and frequency (the Jansky dimension)
    pub const ENERGY_FNU: Self = Self::new(1, 0, -2, 0, 0, 0);

    pub const fn is_dimensionless(&self) -> bool {
        self.mass == 0
            && self.length == 0
            && self.time == 0
            && self.temperature == 0
            && self.angle == 0
            && self.count == 0
    }

    pub const fn pow(&self, exp: i8) -> Self {
        Self::new(
            self.mass * exp,
            self.length * exp,
            self.time * exp,
            self.temperature * exp,
            self.angle * exp,
            self.count * exp,
        )
    }

    /// Split off the angle exponent, returning the remaining dimension and
    /// the exponent that was removed.
    ///
    /// Surface brightness units (per arcsec²) carry an angle term that plays
    /// no part in spectral conversions.
    pub const fn split_angle(&self) -> (Self, i8) {
        let mut base = *self;
        base.angle = 0;
        (base, self.angle)
    }
}

impl Mul for Dimension {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(
            self.mass + rhs.mass,
            self.length + rhs.length,
            self.time + rhs.time,
            self.temperature + rhs.temperature,
            self.angle + rhs.angle,
            self.count + rhs.count,
        )
    }
}

impl Div for Dimension {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self * rhs.pow(-1)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let parts = [
            ("M", self.mass),
            ("L", self.length),
            ("T", self.time),
            ("Θ", self.temperature),
            ("A", self.angle),
            ("N", self.count),
        ];
        let rendered: Vec<String> = parts
            .iter()
            .filter(|(_, exp)| *exp != 0)
            .map(|(symbol, exp)| {
                if *exp == 1 {
                    symbol.to_string()
                } else {
                    format!("{symbol}^{exp}")
                }
            })
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flux_density_composition() {
        let energy_per_area_time = Dimension::ENERGY / Dimension::AREA / Dimension::TIME;
        assert_eq!(energy_per_area_time, Dimension::ENERGY_FLUX);
        assert_eq!(
            energy_per_area_time / Dimension::LENGTH,
            Dimension::ENERGY_FLUX_DENSITY
        );
        assert_eq!(
            energy_per_area_time / Dimension::FREQUENCY,
            Dimension::ENERGY_FNU
        );
    }

    #[test]
    fn test_split_angle() {
        let surface = Dimension::PHOTON_FLUX_DENSITY / Dimension::ANGLE.pow(2);
        let (base, angle) = surface.split_angle();
        assert_eq!(base, Dimension::PHOTON_FLUX_DENSITY);
        assert_eq!(angle, -2);
    }

    #[test]
    fn test_display() {
        assert_eq!(Dimension::dimensionless().to_string(), "dimensionless");
        assert_eq!(Dimension::ENERGY.to_string(), "M L^2 T^-2");
    }
}
