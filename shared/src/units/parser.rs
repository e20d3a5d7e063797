//! Unit string parser.
//!
//! Handles the spellings found in data-file headers and settings documents:
//!
//! - Exponents: `m^2`, `m**2`, `m2`, `s^-1`, `s-1`
//! - Multiplication: `erg cm`, `erg*cm`, `erg·cm`
//! - Division: `erg/s/cm2/AA`, `W m^-2`, `photon per s`
//! - Grouping: `photon / (s arcsec2 nm m2)`
//! - Numeric scale factors: `1e-17 erg/s/cm2/AA`, `10**-17 W m-2 Hz-1`
//!
//! # Grammar
//!
//! ```text
//! unit_expr  = term (('/' | 'per') term)*
//! term       = factor (('*' | '·' | ' ') factor)*
//! factor     = (symbol | number | '(' unit_expr ')') (('^' | '**')? exponent)?
//! exponent   = '-'? [0-9]+
//! ```

use std::collections::BTreeMap;
use std::fmt;

use super::dimension::Dimension;
use super::registry::UNIT_REGISTRY;
use super::UnitError;

/// A product of registered unit symbols raised to integer powers, with an
/// optional numeric scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUnit {
    scale: f64,
    components: BTreeMap<String, i32>,
    dimension: Dimension,
    si_factor: f64,
}

impl ParsedUnit {
    pub fn dimensionless() -> Self {
        Self {
            scale: 1.0,
            components: BTreeMap::new(),
            dimension: Dimension::dimensionless(),
            si_factor: 1.0,
        }
    }

    fn from_symbol(symbol: &str, exp: i32) -> Result<Self, UnitError> {
        let info = UNIT_REGISTRY
            .lookup(symbol)
            .ok_or_else(|| UnitError::UnknownUnit(symbol.to_string()))?;
        let mut components = BTreeMap::new();
        components.insert(symbol.to_string(), exp);
        Ok(Self {
            scale: 1.0,
            components,
            dimension: info.dimension.pow(exp as i8),
            si_factor: info.to_si_factor.powi(exp),
        })
    }

    fn from_scale(scale: f64) -> Self {
        Self {
            scale,
            si_factor: scale,
            ..Self::dimensionless()
        }
    }

    pub fn parse(input: &str) -> Result<Self, UnitError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "1" || trimmed.eq_ignore_ascii_case("dimensionless") {
            return Ok(Self::dimensionless());
        }

        let mut parser = UnitParser::new(trimmed);
        let unit = parser.parse_expression()?;
        parser.skip_whitespace();
        match parser.peek() {
            None => Ok(unit),
            Some(c) => Err(parser.error(format!("unexpected character '{c}'"))),
        }
    }

    pub fn components(&self) -> &BTreeMap<String, i32> {
        &self.components
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Multiplier converting a value in this unit to SI base units.
    pub fn si_factor(&self) -> f64 {
        self.si_factor
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dimension.is_dimensionless()
    }

    pub fn multiply(&self, other: &Self) -> Self {
        let mut components = self.components.clone();
        for (symbol, exp) in &other.components {
            *components.entry(symbol.clone()).or_insert(0) += exp;
        }
        components.retain(|_, exp| *exp != 0);
        Self {
            scale: self.scale * other.scale,
            components,
            dimension: self.dimension * other.dimension,
            si_factor: self.si_factor * other.si_factor,
        }
    }

    pub fn divide(&self, other: &Self) -> Self {
        self.multiply(&other.pow(-1))
    }

    pub fn pow(&self, exp: i32) -> Self {
        let components = self
            .components
            .iter()
            .map(|(k, v)| (k.clone(), v * exp))
            .filter(|(_, v)| *v != 0)
            .collect();
        Self {
            scale: self.scale.powi(exp),
            components,
            dimension: self.dimension.pow(exp as i8),
            si_factor: self.si_factor.powi(exp),
        }
    }

    /// Canonical text form, numerator symbols first then `/` and the
    /// denominator, e.g. `photon / (arcsec^2 m^2 nm s)`.
    pub fn normalized(&self) -> String {
        let format_part = |parts: Vec<(&str, i32)>| -> String {
            parts
                .iter()
                .map(|(s, e)| {
                    if *e == 1 {
                        s.to_string()
                    } else {
                        format!("{s}^{e}")
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        };

        let numerator: Vec<(&str, i32)> = self
            .components
            .iter()
            .filter(|(_, e)| **e > 0)
            .map(|(s, e)| (s.as_str(), *e))
            .collect();
        let denominator: Vec<(&str, i32)> = self
            .components
            .iter()
            .filter(|(_, e)| **e < 0)
            .map(|(s, e)| (s.as_str(), -*e))
            .collect();
        let den_count = denominator.len();

        let mut num_str = format_part(numerator);
        if self.scale != 1.0 {
            num_str = if num_str.is_empty() {
                format!("{}", self.scale)
            } else {
                format!("{} {num_str}", self.scale)
            };
        }
        let den_str = format_part(denominator);

        match (num_str.is_empty(), den_str.is_empty()) {
            (true, true) => String::new(),
            (false, true) => num_str,
            (true, false) if den_count > 1 => format!("1 / ({den_str})"),
            (true, false) => format!("1 / {den_str}"),
            (false, false) if den_count > 1 => format!("{num_str} / ({den_str})"),
            (false, false) => format!("{num_str} / {den_str}"),
        }
    }
}

impl fmt::Display for ParsedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized())
    }
}

struct UnitParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> UnitParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn error(&self, reason: String) -> UnitError {
        UnitError::Parse {
            input: self.input.to_string(),
            reason,
        }
    }

    fn parse_expression(&mut self) -> Result<ParsedUnit, UnitError> {
        self.skip_whitespace();
        let mut result = self.parse_term()?;

        loop {
            self.skip_whitespace();
            if self.peek() == Some('/') {
                self.advance();
            } else if self.check_keyword("per") {
                self.pos += 3;
            } else {
                break;
            }
            self.skip_whitespace();
            let divisor = self.parse_term()?;
            result = result.divide(&divisor);
        }

        Ok(result)
    }

    fn parse_term(&mut self) -> Result<ParsedUnit, UnitError> {
        let mut result = self.parse_factor()?;

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('*') | Some('\u{00B7}') => {
                    self.advance();
                    self.skip_whitespace();
                    let factor = self.parse_factor()?;
                    result = result.multiply(&factor);
                }
                Some(c) if Self::is_unit_start(c) && !self.check_keyword("per") => {
                    // Implicit multiplication (space-separated)
                    let factor = self.parse_factor()?;
                    result = result.multiply(&factor);
                }
                _ => break,
            }
        }

        Ok(result)
    }

    fn parse_factor(&mut self) -> Result<ParsedUnit, UnitError> {
        self.skip_whitespace();

        let base = match self.peek() {
            Some('(') => {
                self.advance();
                let inner = self.parse_expression()?;
                self.skip_whitespace();
                if self.peek() != Some(')') {
                    return Err(self.error("missing closing parenthesis".into()));
                }
                self.advance();
                inner
            }
            Some(c) if c.is_ascii_digit() || c == '.' => ParsedUnit::from_scale(self.parse_number()?),
            Some(_) => {
                let symbol = self.parse_symbol()?;
                ParsedUnit::from_symbol(&symbol, 1)?
            }
            None => return Err(self.error("unexpected end of unit".into())),
        };

        let exp = self.parse_optional_exponent()?;
        Ok(if exp == 1 { base } else { base.pow(exp) })
    }

    fn parse_symbol(&mut self) -> Result<String, UnitError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphabetic() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            let found = self.peek().map(String::from).unwrap_or_default();
            return Err(self.error(format!("expected a unit symbol, found '{found}'")));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<f64, UnitError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '-' || c == '+')
                && self.input[..self.pos].ends_with(['e', 'E']);
            if c.is_ascii_digit() || c == '.' || exponent_sign {
                self.advance();
            } else if (c == 'e' || c == 'E') && self.exponent_follows() {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        text.parse()
            .map_err(|_| self.error(format!("invalid number '{text}'")))
    }

    /// True when the character after an `e` continues a float literal
    /// rather than starting a symbol such as `erg`.
    fn exponent_follows(&self) -> bool {
        let mut rest = self.input[self.pos..].chars().skip(1);
        match rest.next() {
            Some(d) if d.is_ascii_digit() => true,
            Some('-') | Some('+') => rest.next().is_some_and(|d| d.is_ascii_digit()),
            _ => false,
        }
    }

    fn parse_optional_exponent(&mut self) -> Result<i32, UnitError> {
        let has_marker = if self.input[self.pos..].starts_with("**") {
            self.pos += 2;
            true
        } else if self.peek() == Some('^') {
            self.advance();
            true
        } else {
            false
        };

        if has_marker {
            self.skip_whitespace();
        }

        match self.peek() {
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_exponent(),
            _ if has_marker => Err(self.error("expected exponent after '^'".into())),
            _ => Ok(1),
        }
    }

    fn parse_exponent(&mut self) -> Result<i32, UnitError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let exp_str = &self.input[start..self.pos];
        exp_str
            .parse()
            .map_err(|_| self.error(format!("invalid exponent '{exp_str}'")))
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn is_unit_start(c: char) -> bool {
        c.is_alphabetic() || c == '_' || c == '('
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        let rest = &self.input[self.pos..];
        rest.get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
            && rest[keyword.len()..]
                .chars()
                .next()
                .is_none_or(|c| !c.is_alphanumeric())
    }
}
