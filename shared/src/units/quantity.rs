//! Values tagged with a unit.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::dimension::Dimension;
use super::magnitude::MagnitudeSystem;
use super::parser::ParsedUnit;
use super::spectral::{self, SpectralContext};
use super::UnitError;

/// Either an ordinary product of unit symbols or a magnitude system.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    Linear(ParsedUnit),
    Magnitude(MagnitudeSystem),
}

impl Unit {
    pub fn dimensionless() -> Self {
        Unit::Linear(ParsedUnit::dimensionless())
    }

    pub fn parse(text: &str) -> Result<Self, UnitError> {
        match MagnitudeSystem::from_name(text) {
            Some(system) => Ok(Unit::Magnitude(system)),
            None => ParsedUnit::parse(text).map(Unit::Linear),
        }
    }

    /// Physical dimension, or `None` for magnitudes.
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            Unit::Linear(unit) => Some(unit.dimension()),
            Unit::Magnitude(_) => None,
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dimension().is_some_and(|d| d.is_dimensionless())
    }

    pub fn is_magnitude(&self) -> bool {
        matches!(self, Unit::Magnitude(_))
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::parse(s)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Linear(unit) => write!(f, "{unit}"),
            Unit::Magnitude(system) => write!(f, "{system}"),
        }
    }
}

/// A scalar value and its unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawQuantity")]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

/// Settings documents write quantities as `"0.8 arcsec"` or as bare numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(f64),
    Text(String),
}

impl TryFrom<RawQuantity> for Quantity {
    type Error = UnitError;

    fn try_from(raw: RawQuantity) -> Result<Self, Self::Error> {
        match raw {
            RawQuantity::Number(value) => Ok(Quantity::dimensionless(value)),
            RawQuantity::Text(text) => Quantity::parse(&text),
        }
    }
}

/// Split a leading float literal from `text`.
fn split_number(text: &str) -> Option<(f64, &str)> {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let mantissa_start = end;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if end == mantissa_start {
        return None;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::new(value, Unit::dimensionless())
    }

    /// Parse `"<number> <unit>"`. Magnitude suffixes may follow the number
    /// with or without a space; a bare number is dimensionless.
    pub fn parse(text: &str) -> Result<Self, UnitError> {
        let trimmed = text.trim();
        if let Some((value, system)) = MagnitudeSystem::split_quantity(trimmed) {
            return Ok(Self::new(value, Unit::Magnitude(system)));
        }
        let (value, rest) = split_number(trimmed).ok_or_else(|| UnitError::Parse {
            input: text.to_string(),
            reason: "expected a leading number".to_string(),
        })?;
        Ok(Self::new(value, Unit::parse(rest)?))
    }

    pub fn dimension(&self) -> Option<Dimension> {
        self.unit.dimension()
    }

    /// Convert to a unit of identical dimension.
    pub fn to(&self, target: &Unit) -> Result<Quantity, UnitError> {
        match (&self.unit, target) {
            (Unit::Linear(from), Unit::Linear(to)) if from.dimension() == to.dimension() => Ok(
                Quantity::new(self.value * (from.si_factor() / to.si_factor()), target.clone()),
            ),
            (Unit::Magnitude(from), Unit::Magnitude(to)) if from == to => Ok(self.clone()),
            _ => Err(UnitError::IncompatibleUnit {
                from: self.unit.to_string(),
                to: target.to_string(),
            }),
        }
    }

    /// Numeric value after converting to the unit written as `unit`.
    pub fn value_in(&self, unit: &str) -> Result<f64, UnitError> {
        Ok(self.to(&Unit::parse(unit)?)?.value)
    }

    /// Convert using a spectral context for flux densities and magnitudes.
    pub fn to_with(
        &self,
        target: &Unit,
        context: &SpectralContext,
    ) -> Result<Quantity, UnitError> {
        spectral::convert(self, target, context)
    }

    pub fn value_in_with(&self, unit: &str, context: &SpectralContext) -> Result<f64, UnitError> {
        Ok(self.to_with(&Unit::parse(unit)?, context)?.value)
    }

    fn mismatch(&self, op: &'static str, other: &Quantity) -> UnitError {
        UnitError::UnitMismatch {
            op,
            lhs: self.unit.to_string(),
            rhs: other.unit.to_string(),
        }
    }

    fn linear_units<'a>(
        &'a self,
        op: &'static str,
        other: &'a Quantity,
    ) -> Result<(&'a ParsedUnit, &'a ParsedUnit), UnitError> {
        match (&self.unit, &other.unit) {
            (Unit::Linear(a), Unit::Linear(b)) => Ok((a, b)),
            _ => Err(self.mismatch(op, other)),
        }
    }

    /// Sum in the unit of `self`.
    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity, UnitError> {
        self.linear_units("addition", other)?;
        let rhs = other
            .to(&self.unit)
            .map_err(|_| self.mismatch("addition", other))?;
        Ok(Quantity::new(self.value + rhs.value, self.unit.clone()))
    }

    /// Difference in the unit of `self`.
    pub fn checked_sub(&self, other: &Quantity) -> Result<Quantity, UnitError> {
        self.linear_units("subtraction", other)?;
        let rhs = other
            .to(&self.unit)
            .map_err(|_| self.mismatch("subtraction", other))?;
        Ok(Quantity::new(self.value - rhs.value, self.unit.clone()))
    }

    pub fn checked_mul(&self, other: &Quantity) -> Result<Quantity, UnitError> {
        let (a, b) = self.linear_units("multiplication", other)?;
        Ok(Quantity::new(
            self.value * other.value,
            Unit::Linear(a.multiply(b)),
        ))
    }

    pub fn checked_div(&self, other: &Quantity) -> Result<Quantity, UnitError> {
        let (a, b) = self.linear_units("division", other)?;
        Ok(Quantity::new(
            self.value / other.value,
            Unit::Linear(a.divide(b)),
        ))
    }
}

impl FromStr for Quantity {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quantity::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.unit.to_string();
        if unit.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_parse_forms() {
        let seeing = Quantity::parse("0.8 arcsec").unwrap();
        assert_relative_eq!(seeing.value, 0.8);
        assert_eq!(seeing.dimension(), Some(Dimension::ANGLE));

        let bare = Quantity::parse("1.3").unwrap();
        assert!(bare.unit.is_dimensionless());

        let sci = Quantity::parse("1e-17 erg/s/cm2/AA").unwrap();
        assert_relative_eq!(sci.value, 1e-17);
        assert_eq!(sci.dimension(), Some(Dimension::ENERGY_FLUX_DENSITY));

        let tight = Quantity::parse("5erg").unwrap();
        assert_relative_eq!(tight.value, 5.0);
        assert_eq!(tight.dimension(), Some(Dimension::ENERGY));
    }

    #[test]
    fn test_parse_magnitudes() {
        for text in ["20 magab", "20magab", "20 mag(AB)", "20 ABmag", "20 mag (AB)"] {
            let q = Quantity::parse(text).unwrap();
            assert_eq!(q.unit, Unit::Magnitude(MagnitudeSystem::AB), "{text}");
            assert_relative_eq!(q.value, 20.0);
        }
        let st = Quantity::parse("18.5 stmag").unwrap();
        assert_eq!(st.unit, Unit::Magnitude(MagnitudeSystem::ST));
        let bol = Quantity::parse("4.7 mag(bol)").unwrap();
        assert_eq!(bol.unit, Unit::Magnitude(MagnitudeSystem::Bolometric));
    }

    #[test]
    fn test_parse_rejects_missing_number() {
        assert!(matches!(
            Quantity::parse("arcsec"),
            Err(UnitError::Parse { .. })
        ));
    }

    #[test]
    fn test_ordinary_conversion() {
        let area = Quantity::parse("76 m2").unwrap();
        assert_relative_eq!(area.value_in("cm2").unwrap(), 760_000.0, max_relative = 1e-12);

        let wavelength = Quantity::parse("21900 AA").unwrap();
        assert_relative_eq!(wavelength.value_in("nm").unwrap(), 2190.0, max_relative = 1e-12);

        assert!(matches!(
            wavelength.value_in("s"),
            Err(UnitError::IncompatibleUnit { .. })
        ));
    }

    #[test]
    fn test_arithmetic_units() {
        let rate = Quantity::parse("10 photon / s").unwrap();
        let time = Quantity::parse("2 min").unwrap();
        let count = rate.checked_mul(&time).unwrap();
        assert_relative_eq!(count.value_in("photon").unwrap(), 1200.0, max_relative = 1e-12);

        let width = Quantity::parse("0.7 arcsec").unwrap();
        let length = Quantity::parse("20 arcsec").unwrap();
        let area = width.checked_mul(&length).unwrap();
        let ratio = area.checked_div(&width.checked_mul(&width).unwrap()).unwrap();
        assert!(ratio.unit.is_dimensionless());

        let sum = length
            .checked_add(&Quantity::parse("1 arcmin").unwrap())
            .unwrap();
        assert_relative_eq!(sum.value, 80.0, max_relative = 1e-12);
    }

    #[test]
    fn test_arithmetic_mismatch() {
        let length = Quantity::parse("20 arcsec").unwrap();
        let time = Quantity::parse("3 s").unwrap();
        assert!(matches!(
            length.checked_add(&time),
            Err(UnitError::UnitMismatch { .. })
        ));
        let mag = Quantity::parse("20 magab").unwrap();
        assert!(matches!(
            mag.checked_mul(&time),
            Err(UnitError::UnitMismatch { .. })
        ));
        assert!(matches!(
            mag.checked_add(&mag),
            Err(UnitError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn test_deserialize_from_settings() {
        let from_text: Quantity = serde_json::from_str("\"3 mm\"").unwrap();
        assert_relative_eq!(from_text.value_in("mm").unwrap(), 3.0, max_relative = 1e-12);
        let from_number: Quantity = serde_json::from_str("1.5").unwrap();
        assert!(from_number.unit.is_dimensionless());
        assert!(serde_json::from_str::<Quantity>("\"3 parsecs\"").is_err());
    }
}
