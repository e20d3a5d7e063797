//! Astronomical magnitude systems.
//!
//! A magnitude is `-2.5 log10(F / F0)` against a zero-point flux `F0`.
//! AB, ST and bolometric magnitudes carry fixed zero points; Vega-relative
//! magnitudes take theirs from a reference spectrum supplied at conversion
//! time.

use std::fmt;

use super::parser::ParsedUnit;
use super::UnitError;

/// AB zero point, 3631 Jy
pub const AB_ZERO_POINT_JY: f64 = 3631.0;

/// ST magnitude offset, F_λ = 10^(-0.4 (m + 21.1)) erg s⁻¹ cm⁻² Å⁻¹
pub const ST_MAGNITUDE_OFFSET: f64 = 21.1;

/// Apparent bolometric zero-point flux in W m⁻² (IAU 2015 B2)
pub const BOLOMETRIC_ZERO_POINT_W_M2: f64 = 2.518021002e-8;

/// Suffix spellings recognised on magnitude strings, after lowercasing and
/// removing whitespace. Longer spellings come first so that suffix matching
/// never stops at a shorter spelling.
const SPELLINGS: &[(&str, MagnitudeSystem)] = &[
    ("mag(vega)", MagnitudeSystem::Vega),
    ("mag(bol)", MagnitudeSystem::Bolometric),
    ("mag(ab)", MagnitudeSystem::AB),
    ("mag(st)", MagnitudeSystem::ST),
    ("vegamag", MagnitudeSystem::Vega),
    ("magvega", MagnitudeSystem::Vega),
    ("bolmag", MagnitudeSystem::Bolometric),
    ("magbol", MagnitudeSystem::Bolometric),
    ("abmag", MagnitudeSystem::AB),
    ("magab", MagnitudeSystem::AB),
    ("stmag", MagnitudeSystem::ST),
    ("magst", MagnitudeSystem::ST),
    ("m_bol", MagnitudeSystem::Bolometric),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagnitudeSystem {
    AB,
    ST,
    Vega,
    Bolometric,
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

impl MagnitudeSystem {
    /// Match a complete unit string such as `"mag(AB)"` or `"STmag"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let squashed = squash(name);
        SPELLINGS
            .iter()
            .find(|(spelling, _)| *spelling == squashed)
            .map(|(_, system)| *system)
    }

    /// Split a quantity string such as `"20 magab"` or `"21.5mag(Vega)"`
    /// into its numeric part and magnitude system.
    ///
    /// Returns `None` when the string does not end in a magnitude suffix or
    /// the remaining text is not a number.
    pub fn split_quantity(text: &str) -> Option<(f64, Self)> {
        let squashed = squash(text);
        SPELLINGS.iter().find_map(|(spelling, system)| {
            let number = squashed.strip_suffix(spelling)?;
            number.parse::<f64>().ok().map(|value| (value, *system))
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            MagnitudeSystem::AB => "mag(AB)",
            MagnitudeSystem::ST => "mag(ST)",
            MagnitudeSystem::Vega => "mag(Vega)",
            MagnitudeSystem::Bolometric => "mag(bol)",
        }
    }

    /// The unit the zero point is expressed in and its value there.
    ///
    /// Vega has no fixed zero point and returns `None`.
    pub fn zero_point(&self) -> Option<Result<(ParsedUnit, f64), UnitError>> {
        match self {
            MagnitudeSystem::AB => Some(ParsedUnit::parse("Jy").map(|u| (u, AB_ZERO_POINT_JY))),
            MagnitudeSystem::ST => Some(
                ParsedUnit::parse("erg / (s cm2 AA)")
                    .map(|u| (u, 10f64.powf(-0.4 * ST_MAGNITUDE_OFFSET))),
            ),
            MagnitudeSystem::Bolometric => {
                Some(ParsedUnit::parse("W / m2").map(|u| (u, BOLOMETRIC_ZERO_POINT_W_M2)))
            }
            MagnitudeSystem::Vega => None,
        }
    }
}

/// Flux corresponding to `magnitude` against `zero_point`.
pub fn magnitude_to_flux(magnitude: f64, zero_point: f64) -> f64 {
    zero_point * 10f64.powf(-0.4 * magnitude)
}

/// Magnitude of `flux` against `zero_point`.
pub fn flux_to_magnitude(flux: f64, zero_point: f64) -> f64 {
    -2.5 * (flux / zero_point).log10()
}

impl fmt::Display for MagnitudeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_spelling_variants() {
        for name in ["mag(AB)", "ABmag", "magab", "mag (AB)"] {
            assert_eq!(MagnitudeSystem::from_name(name), Some(MagnitudeSystem::AB), "{name}");
        }
        assert_eq!(MagnitudeSystem::from_name("STmag"), Some(MagnitudeSystem::ST));
        assert_eq!(MagnitudeSystem::from_name("vegamag"), Some(MagnitudeSystem::Vega));
        assert_eq!(MagnitudeSystem::from_name("mag(bol)"), Some(MagnitudeSystem::Bolometric));
        assert_eq!(MagnitudeSystem::from_name("m_bol"), Some(MagnitudeSystem::Bolometric));
        assert_eq!(MagnitudeSystem::from_name("mag"), None);
    }

    #[test]
    fn test_split_quantity() {
        assert_eq!(
            MagnitudeSystem::split_quantity("20 magab"),
            Some((20.0, MagnitudeSystem::AB))
        );
        assert_eq!(
            MagnitudeSystem::split_quantity("21.5mag(Vega)"),
            Some((21.5, MagnitudeSystem::Vega))
        );
        assert_eq!(
            MagnitudeSystem::split_quantity("-1.2 STmag"),
            Some((-1.2, MagnitudeSystem::ST))
        );
        assert_eq!(MagnitudeSystem::split_quantity("20 nm"), None);
        assert_eq!(MagnitudeSystem::split_quantity("bright magab"), None);
    }

    #[test]
    fn test_magnitude_flux_inverse() {
        let flux = magnitude_to_flux(2.5, 100.0);
        assert_relative_eq!(flux, 10.0, max_relative = 1e-12);
        assert_relative_eq!(flux_to_magnitude(flux, 100.0), 2.5, max_relative = 1e-12);
    }

    #[test]
    fn test_st_zero_point() {
        let (_, zero) = MagnitudeSystem::ST.zero_point().unwrap().unwrap();
        assert_relative_eq!(zero, 3.630780547701e-9, max_relative = 1e-9);
    }
}
